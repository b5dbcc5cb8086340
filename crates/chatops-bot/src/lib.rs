//! Runnable chat-operations bot built on `chatops-core`.

pub mod app;
pub mod config;
pub mod console;
pub mod error;
pub mod finishers;
pub mod handlers;

pub use app::App;
pub use config::Config;
pub use error::{AppError, AppResult};
