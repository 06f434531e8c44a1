pub mod window;

pub use window::{ShowWindow, WindowError, CHANGEOVER_BUFFER_MINUTES};
