//! Minimal Telegram Bot API client: `sendMessage` and long-poll `getUpdates`.
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const API_BASE: &str = "https://api.telegram.org";

#[derive(Error, Debug)]
pub enum TelegramError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Telegram API returned non-success status: {status}. Body: {body}")]
    Api { status: u16, body: String },
    #[error("Telegram API rejected the request: {0}")]
    Rejected(String),
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'a str,
}

#[derive(Serialize)]
struct GetUpdates<'a> {
    offset: i64,
    timeout: u64,
    allowed_updates: &'a [&'a str],
}

#[derive(Deserialize, Debug)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Message {
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Chat {
    pub id: i64,
    pub username: Option<String>,
}

#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    base_url: String,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The base URL embeds the bot token.
        f.debug_struct("TelegramClient").finish_non_exhaustive()
    }
}

impl TelegramClient {
    pub fn new(bot_token: &str, poll_timeout: Duration) -> Result<Self, TelegramError> {
        let client = Client::builder()
            // Long polls must be allowed to outlive the server-side wait.
            .timeout(poll_timeout + Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: format!("{API_BASE}/bot{bot_token}"),
        })
    }

    /// Sends `text` as MarkdownV2 after escaping it.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TelegramError> {
        let escaped = escape_markdown_v2(text);
        let payload = SendMessage {
            chat_id,
            text: &escaped,
            parse_mode: "MarkdownV2",
        };
        let _: serde_json::Value = self.call("sendMessage", &payload).await?;
        Ok(())
    }

    /// Long-polls for updates after `offset`.
    pub async fn get_updates(
        &self,
        offset: i64,
        timeout: Duration,
    ) -> Result<Vec<Update>, TelegramError> {
        let payload = GetUpdates {
            offset,
            timeout: timeout.as_secs(),
            allowed_updates: &["message"],
        };
        self.call("getUpdates", &payload).await
    }

    async fn call<P, T>(&self, method: &str, payload: &P) -> Result<T, TelegramError>
    where
        P: Serialize + ?Sized,
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}/{method}", self.base_url);
        let response = self.client.post(&url).json(payload).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(TelegramError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body: ApiResponse<T> = response.json().await?;
        match (body.ok, body.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(TelegramError::Rejected(
                body.description.unwrap_or_else(|| "no description".to_string()),
            )),
        }
    }
}

/// Escapes text for Telegram MarkdownV2.
/// Characters to escape: _ * [ ] ( ) ~ ` > # + - = | { } . !
pub fn escape_markdown_v2(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(
            c,
            '_' | '*' | '[' | ']' | '(' | ')' | '~' | '`' | '>' | '#' | '+' | '-' | '=' | '|'
                | '{' | '}' | '.' | '!' | '\\'
        ) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_markdown_v2() {
        assert_eq!(escape_markdown_v2("plain text"), "plain text");
        assert_eq!(escape_markdown_v2("a.b-c!"), "a\\.b\\-c\\!");
        assert_eq!(escape_markdown_v2("(10 ms)"), "\\(10 ms\\)");
        assert_eq!(escape_markdown_v2("back\\slash"), "back\\\\slash");
    }

    #[test]
    fn test_update_deserializes() {
        let raw = r#"{"ok":true,"result":[{"update_id":10,"message":{"message_id":1,
            "chat":{"id":918,"type":"private","username":"alice"},"text":"/status"}}]}"#;
        let parsed: ApiResponse<Vec<Update>> = serde_json::from_str(raw).unwrap();
        let updates = parsed.result.unwrap();
        assert_eq!(updates[0].update_id, 10);
        let message = updates[0].message.as_ref().unwrap();
        assert_eq!(message.chat.id, 918);
        assert_eq!(message.text.as_deref(), Some("/status"));
    }

    #[test]
    fn test_debug_hides_token() {
        let client = TelegramClient::new("123:SECRET", Duration::from_secs(1)).unwrap();
        assert!(!format!("{client:?}").contains("SECRET"));
    }
}
