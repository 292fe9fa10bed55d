use async_trait::async_trait;
use thiserror::Error;

use crate::models::SubjectId;

pub mod messages;
pub mod telegram;

pub use telegram::TelegramNotifier;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Telegram error: {0}")]
    Telegram(#[from] crate::telegram::TelegramError),
}

/// Delivers a message to a subject. Callers treat failures as non-fatal.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, subject: SubjectId, message: &str) -> Result<(), NotifyError>;
}
