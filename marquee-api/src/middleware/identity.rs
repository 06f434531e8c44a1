use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::Response,
};

/// Caller identity, resolved upstream by the gateway and forwarded in the
/// `x-user-id` header.
#[derive(Debug, Clone)]
pub struct UserId(pub String);

pub async fn require_user(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    let user_id = req
        .headers()
        .get("x-user-id")
        .and_then(|h| h.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or(StatusCode::UNAUTHORIZED)?
        .to_string();

    req.extensions_mut().insert(UserId(user_id));

    Ok(next.run(req).await)
}
