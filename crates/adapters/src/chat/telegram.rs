// SPDX-License-Identifier: Apache-2.0

//! Telegram chat adapter: Bot API over HTTPS, one forum topic per session.

use super::http::HttpTransport;
use super::{ChatAdapter, ChatError, SentMessageId};
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use teleclaude_core::session::AdapterKey;

/// Telegram's hard per-message character ceiling.
const MAX_MESSAGE_LENGTH: usize = 4096;

fn markdown_v2_escape_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([_\*\[\]\(\)~`>#\+\-=\|\{\}\.!])").expect("valid regex"))
}

pub struct TelegramChatAdapter<T: HttpTransport> {
    transport: T,
    bot_token: String,
    chat_id: String,
}

impl<T: HttpTransport> TelegramChatAdapter<T> {
    pub fn new(transport: T, bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            transport,
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{}", self.bot_token, method)
    }
}

#[async_trait]
impl<T: HttpTransport> ChatAdapter for TelegramChatAdapter<T> {
    fn adapter_key(&self) -> AdapterKey {
        AdapterKey::Telegram
    }

    fn max_message_length(&self) -> usize {
        MAX_MESSAGE_LENGTH
    }

    /// Escapes Telegram's MarkdownV2 reserved characters. A parse error
    /// here is a `PlatformConstraint`, never retried against the same
    /// body.
    fn to_platform_markdown(&self, body: &str) -> String {
        markdown_v2_escape_re().replace_all(body, r"\$1").into_owned()
    }

    async fn send_message(&self, channel_id: &str, body: &str) -> Result<SentMessageId, ChatError> {
        let value = self
            .transport
            .post_json(
                &self.api_url("sendMessage"),
                serde_json::json!({
                    "chat_id": self.chat_id,
                    "message_thread_id": channel_id,
                    "text": self.to_platform_markdown(body),
                    "parse_mode": "MarkdownV2",
                }),
            )
            .await?;
        message_id_from_result(&value)
    }

    async fn send_file(
        &self,
        channel_id: &str,
        filename: &str,
        data: &[u8],
    ) -> Result<SentMessageId, ChatError> {
        let value = self
            .transport
            .post_multipart(&self.api_url("sendDocument"), "document", filename, data.to_vec())
            .await?;
        let _ = channel_id;
        message_id_from_result(&value)
    }

    async fn send_voice(&self, channel_id: &str, data: &[u8]) -> Result<SentMessageId, ChatError> {
        let value = self
            .transport
            .post_multipart(&self.api_url("sendVoice"), "voice", "voice.ogg", data.to_vec())
            .await?;
        let _ = channel_id;
        message_id_from_result(&value)
    }

    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &SentMessageId,
        body: &str,
    ) -> Result<(), ChatError> {
        self.transport
            .post_json(
                &self.api_url("editMessageText"),
                serde_json::json!({
                    "chat_id": self.chat_id,
                    "message_thread_id": channel_id,
                    "message_id": message_id.0,
                    "text": self.to_platform_markdown(body),
                    "parse_mode": "MarkdownV2",
                }),
            )
            .await?;
        Ok(())
    }

    async fn ensure_channel(&self, session_label: &str) -> Result<String, ChatError> {
        let value = self
            .transport
            .post_json(
                &self.api_url("createForumTopic"),
                serde_json::json!({ "chat_id": self.chat_id, "name": session_label }),
            )
            .await?;
        value["result"]["message_thread_id"]
            .as_i64()
            .map(|id| id.to_string())
            .ok_or_else(|| ChatError::Transient("missing message_thread_id in response".into()))
    }

    async fn update_title(&self, channel_id: &str, title: &str) -> Result<(), ChatError> {
        self.transport
            .post_json(
                &self.api_url("editForumTopic"),
                serde_json::json!({ "chat_id": self.chat_id, "message_thread_id": channel_id, "name": title }),
            )
            .await?;
        Ok(())
    }

    async fn close_channel(&self, channel_id: &str) -> Result<(), ChatError> {
        self.transport
            .post_json(
                &self.api_url("closeForumTopic"),
                serde_json::json!({ "chat_id": self.chat_id, "message_thread_id": channel_id }),
            )
            .await?;
        Ok(())
    }

    async fn delete_channel(&self, channel_id: &str) -> Result<(), ChatError> {
        self.transport
            .post_json(
                &self.api_url("deleteForumTopic"),
                serde_json::json!({ "chat_id": self.chat_id, "message_thread_id": channel_id }),
            )
            .await?;
        Ok(())
    }

    async fn typing_indicator(&self, channel_id: &str) -> Result<(), ChatError> {
        self.transport
            .post_json(
                &self.api_url("sendChatAction"),
                serde_json::json!({ "chat_id": self.chat_id, "message_thread_id": channel_id, "action": "typing" }),
            )
            .await?;
        Ok(())
    }
}

fn message_id_from_result(value: &serde_json::Value) -> Result<SentMessageId, ChatError> {
    value["result"]["message_id"]
        .as_i64()
        .map(|id| SentMessageId(id.to_string()))
        .ok_or_else(|| ChatError::Transient("missing message_id in response".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::http::FakeHttpTransport;

    #[test]
    fn markdown_v2_escapes_reserved_characters() {
        let adapter = TelegramChatAdapter::new(FakeHttpTransport::new(), "t", "c");
        assert_eq!(adapter.to_platform_markdown("a.b!"), r"a\.b\!");
        assert_eq!(adapter.to_platform_markdown("plain text"), "plain text");
    }
}
