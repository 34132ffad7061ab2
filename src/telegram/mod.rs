//! Telegram Bot API client and the outbound contract the relay consumes.

pub mod html;
pub mod types;

pub use types::{BotCommand, ChatRef, Message, Update, User};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

/// The slice of the Bot API the relay needs. Everything is a remote call that
/// may fail; callers decide what a failure means for their path.
#[async_trait]
pub trait BotApi: Send + Sync {
    /// Copy a message into `to`, optionally as a reply. Returns the new
    /// message id in the target chat.
    async fn copy_message(
        &self,
        to: &ChatRef,
        from: &ChatRef,
        message_id: i64,
        reply_to: Option<i64>,
    ) -> Result<i64>;

    /// Send markdown-ish text (converted to Telegram HTML). Returns the new
    /// message id.
    async fn send_message(&self, chat: &ChatRef, text: &str, reply_to: Option<i64>) -> Result<i64>;

    async fn edit_message_text(&self, chat: &ChatRef, message_id: i64, text: &str) -> Result<()>;

    async fn edit_message_caption(
        &self,
        chat: &ChatRef,
        message_id: i64,
        caption: &str,
    ) -> Result<()>;

    async fn delete_message(&self, chat: &ChatRef, message_id: i64) -> Result<bool>;

    /// Install the command menu for one chat.
    async fn set_my_commands(&self, chat: &ChatRef, commands: &[BotCommand]) -> Result<bool>;

    /// Switch the chat's menu button to the command list.
    async fn set_chat_menu_button(&self, chat: &ChatRef) -> Result<bool>;
}

/// reqwest-backed [`BotApi`] implementation.
pub struct TelegramClient {
    bot_token: String,
    client: reqwest::Client,
    /// Base URL for the Telegram Bot API. Defaults to `https://api.telegram.org`.
    /// Override for local Bot API servers or testing.
    api_base: String,
}

impl TelegramClient {
    pub fn new(bot_token: String) -> Self {
        Self {
            bot_token,
            client: reqwest::Client::new(),
            api_base: "https://api.telegram.org".to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: String) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token)
    }

    /// POST one Bot API method and unwrap the `{ok, result}` envelope.
    async fn call(&self, method: &str, body: &Value) -> Result<Value> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        let mut payload: Value = match resp.json().await {
            Ok(payload) => payload,
            Err(e) => anyhow::bail!("Telegram {method} returned unreadable body ({status}): {e}"),
        };

        if !status.is_success() || payload["ok"] != Value::Bool(true) {
            let description = payload["description"].as_str().unwrap_or("no description");
            anyhow::bail!("Telegram {method} failed ({status}): {description}");
        }

        Ok(payload["result"].take())
    }

    fn result_message_id(method: &str, result: &Value) -> Result<i64> {
        result["message_id"]
            .as_i64()
            .ok_or_else(|| anyhow::anyhow!("Telegram {method} result missing message_id"))
    }
}

#[async_trait]
impl BotApi for TelegramClient {
    async fn copy_message(
        &self,
        to: &ChatRef,
        from: &ChatRef,
        message_id: i64,
        reply_to: Option<i64>,
    ) -> Result<i64> {
        let mut body = json!({
            "chat_id": to,
            "from_chat_id": from,
            "message_id": message_id,
        });
        if let Some(reply_to) = reply_to {
            body["reply_to_message_id"] = json!(reply_to);
        }
        // copyMessage returns a bare MessageId, not a full Message.
        let result = self.call("copyMessage", &body).await?;
        Self::result_message_id("copyMessage", &result)
    }

    async fn send_message(&self, chat: &ChatRef, text: &str, reply_to: Option<i64>) -> Result<i64> {
        let mut body = json!({
            "chat_id": chat,
            "text": html::markdown_to_telegram_html(text),
            "parse_mode": "HTML",
            "link_preview_options": { "is_disabled": true },
        });
        if let Some(reply_to) = reply_to {
            body["reply_to_message_id"] = json!(reply_to);
        }
        let result = self.call("sendMessage", &body).await?;
        Self::result_message_id("sendMessage", &result)
    }

    async fn edit_message_text(&self, chat: &ChatRef, message_id: i64, text: &str) -> Result<()> {
        let body = json!({
            "chat_id": chat,
            "message_id": message_id,
            "text": html::markdown_to_telegram_html(text),
            "parse_mode": "HTML",
            "link_preview_options": { "is_disabled": true },
        });
        self.call("editMessageText", &body).await.map(|_| ())
    }

    async fn edit_message_caption(
        &self,
        chat: &ChatRef,
        message_id: i64,
        caption: &str,
    ) -> Result<()> {
        let body = json!({
            "chat_id": chat,
            "message_id": message_id,
            "caption": html::markdown_to_telegram_html(caption),
            "parse_mode": "HTML",
        });
        self.call("editMessageCaption", &body).await.map(|_| ())
    }

    async fn delete_message(&self, chat: &ChatRef, message_id: i64) -> Result<bool> {
        let body = json!({
            "chat_id": chat,
            "message_id": message_id,
        });
        let result = self.call("deleteMessage", &body).await?;
        Ok(result == Value::Bool(true))
    }

    async fn set_my_commands(&self, chat: &ChatRef, commands: &[BotCommand]) -> Result<bool> {
        let body = json!({
            "commands": commands,
            "scope": { "type": "chat", "chat_id": chat },
        });
        let result = self.call("setMyCommands", &body).await?;
        Ok(result == Value::Bool(true))
    }

    async fn set_chat_menu_button(&self, chat: &ChatRef) -> Result<bool> {
        let body = json!({
            "chat_id": chat,
            "menu_button": { "type": "commands" },
        });
        let result = self.call("setChatMenuButton", &body).await?;
        Ok(result == Value::Bool(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_url_embeds_token_and_method() {
        let client = TelegramClient::new("123:abc".into())
            .with_api_base("http://127.0.0.1:9999/".to_string());
        assert_eq!(
            client.api_url("sendMessage"),
            "http://127.0.0.1:9999/bot123:abc/sendMessage"
        );
    }

    #[test]
    fn result_message_id_requires_the_field() {
        let ok = json!({"message_id": 7});
        assert_eq!(
            TelegramClient::result_message_id("copyMessage", &ok).unwrap(),
            7
        );
        let err = TelegramClient::result_message_id("copyMessage", &json!({})).unwrap_err();
        assert!(err.to_string().contains("missing message_id"));
    }
}
