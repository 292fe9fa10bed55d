//! Chat front end: long-polls Telegram and routes commands to the handler.
pub mod commands;
pub mod handler;

pub use commands::Command;
pub use handler::CommandHandler;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::models::SubjectId;
use crate::telegram::{TelegramClient, Update};

const ERROR_BACKOFF: Duration = Duration::from_secs(5);

pub struct Bot {
    client: TelegramClient,
    handler: Arc<CommandHandler>,
    config: Arc<AppConfig>,
}

impl Bot {
    pub fn new(client: TelegramClient, handler: Arc<CommandHandler>, config: Arc<AppConfig>) -> Self {
        Self {
            client,
            handler,
            config,
        }
    }

    /// Polls for updates until `shutdown` flips to true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Bot polling started.");
        let mut offset = 0;

        loop {
            let updates = tokio::select! {
                _ = shutdown.changed() => break,
                result = self.client.get_updates(offset, self.config.poll_timeout()) => result,
            };

            match updates {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        self.dispatch(update).await;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to fetch updates. Retrying in {:?}.", ERROR_BACKOFF);
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                    }
                }
            }
        }
        info!("Bot polling stopped.");
    }

    async fn dispatch(&self, update: Update) {
        let Some(message) = update.message else {
            return;
        };
        let chat_id = message.chat.id;
        let Some(text) = message.text else {
            return;
        };
        if !self.config.is_chat_allowed(chat_id) {
            warn!(chat_id, username = ?message.chat.username, "Ignoring message from a chat that is not allowed.");
            return;
        }

        let command = Command::parse(&text);
        debug!(chat_id, ?command, "Received command.");
        let reply = self.handler.handle(SubjectId(chat_id), command).await;
        if let Err(e) = self.client.send_message(chat_id, &reply).await {
            warn!(chat_id, error = %e, "Failed to send reply.");
        }
    }
}
