use async_trait::async_trait;
use tracing::debug;

use super::{Notifier, NotifyError};
use crate::models::SubjectId;
use crate::telegram::TelegramClient;

/// Pushes notifications to the subject's Telegram chat.
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: TelegramClient,
}

impl TelegramNotifier {
    pub fn new(client: TelegramClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, subject: SubjectId, message: &str) -> Result<(), NotifyError> {
        self.client.send_message(subject.0, message).await?;
        debug!(subject = %subject, "Notification delivered.");
        Ok(())
    }
}
