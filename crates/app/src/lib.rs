//! Terminal client for FinTalk: account login, character and session management, and the
//! interactive streamed chat.

pub mod app;
pub mod chat;
pub mod cli;
pub mod error;
pub mod settings;

pub use app::App;
pub use error::{AppError, AppResult};
