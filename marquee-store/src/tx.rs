use marquee_core::CoreError;
use std::time::Duration;

/// Backoff before the single retry of a transaction that failed transiently.
pub(crate) const RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Deadlock, serialization failure, or a dropped connection. These abort the
/// whole transaction with no partial state, so one retry is safe.
pub(crate) fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => matches!(
            db.code().as_deref(),
            Some("40001") | Some("40P01")
        ),
        _ => false,
    }
}

/// Error type used inside `*_once` transaction bodies: keeps transient sqlx
/// failures distinguishable from domain errors until the retry decision.
#[derive(Debug)]
pub(crate) enum TxError {
    Transient(sqlx::Error),
    Core(CoreError),
}

impl TxError {
    pub(crate) fn into_core(self) -> CoreError {
        match self {
            TxError::Transient(e) => CoreError::Storage(e.to_string()),
            TxError::Core(e) => e,
        }
    }

    pub(crate) fn is_transient(&self) -> bool {
        matches!(self, TxError::Transient(_))
    }
}

impl From<sqlx::Error> for TxError {
    fn from(e: sqlx::Error) -> Self {
        if is_transient(&e) {
            TxError::Transient(e)
        } else {
            TxError::Core(CoreError::Storage(e.to_string()))
        }
    }
}

impl From<CoreError> for TxError {
    fn from(e: CoreError) -> Self {
        TxError::Core(e)
    }
}

/// Constraint name if the error is a unique violation, None otherwise.
pub(crate) fn unique_violation(err: &sqlx::Error) -> Option<String> {
    err.as_database_error()
        .filter(|db| db.is_unique_violation())
        .and_then(|db| db.constraint())
        .map(|c| c.to_string())
}
