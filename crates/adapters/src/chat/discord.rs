// SPDX-License-Identifier: Apache-2.0

//! Discord chat adapter: REST API over HTTPS, one thread per session.

use super::http::HttpTransport;
use super::{ChatAdapter, ChatError, SentMessageId};
use async_trait::async_trait;
use teleclaude_core::session::AdapterKey;

const MAX_MESSAGE_LENGTH: usize = 2000;

pub struct DiscordChatAdapter<T: HttpTransport> {
    transport: T,
    bot_token: String,
    parent_channel_id: String,
}

impl<T: HttpTransport> DiscordChatAdapter<T> {
    pub fn new(transport: T, bot_token: impl Into<String>, parent_channel_id: impl Into<String>) -> Self {
        Self {
            transport,
            bot_token: bot_token.into(),
            parent_channel_id: parent_channel_id.into(),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("https://discord.com/api/v10{}", path)
    }
}

#[async_trait]
impl<T: HttpTransport> ChatAdapter for DiscordChatAdapter<T> {
    fn adapter_key(&self) -> AdapterKey {
        AdapterKey::Discord
    }

    fn max_message_length(&self) -> usize {
        MAX_MESSAGE_LENGTH
    }

    /// Discord's markdown dialect is close enough to CommonMark that no
    /// transformation is needed.
    fn to_platform_markdown(&self, body: &str) -> String {
        body.to_string()
    }

    async fn send_message(&self, channel_id: &str, body: &str) -> Result<SentMessageId, ChatError> {
        let value = self
            .transport
            .post_json(
                &self.api_url(&format!("/channels/{channel_id}/messages")),
                serde_json::json!({ "content": body }),
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
            .post_multipart(
                &self.api_url(&format!("/channels/{channel_id}/messages")),
                "files[0]",
                filename,
                data.to_vec(),
            )
            .await?;
        message_id_from_result(&value)
    }

    async fn send_voice(&self, channel_id: &str, data: &[u8]) -> Result<SentMessageId, ChatError> {
        self.send_file(channel_id, "voice.ogg", data).await
    }

    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &SentMessageId,
        body: &str,
    ) -> Result<(), ChatError> {
        self.transport
            .post_json(
                &self.api_url(&format!("/channels/{channel_id}/messages/{}", message_id.0)),
                serde_json::json!({ "content": body }),
            )
            .await?;
        Ok(())
    }

    async fn ensure_channel(&self, session_label: &str) -> Result<String, ChatError> {
        let value = self
            .transport
            .post_json(
                &self.api_url(&format!("/channels/{}/threads", self.parent_channel_id)),
                serde_json::json!({ "name": session_label, "type": 11 }),
            )
            .await?;
        value["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ChatError::Transient("missing thread id in response".into()))
    }

    async fn update_title(&self, channel_id: &str, title: &str) -> Result<(), ChatError> {
        self.transport
            .post_json(&self.api_url(&format!("/channels/{channel_id}")), serde_json::json!({ "name": title }))
            .await?;
        Ok(())
    }

    async fn close_channel(&self, channel_id: &str) -> Result<(), ChatError> {
        self.transport
            .post_json(&self.api_url(&format!("/channels/{channel_id}")), serde_json::json!({ "archived": true }))
            .await?;
        Ok(())
    }

    async fn delete_channel(&self, channel_id: &str) -> Result<(), ChatError> {
        self.transport
            .post_json(&self.api_url(&format!("/channels/{channel_id}")), serde_json::Value::Null)
            .await?;
        Ok(())
    }

    async fn typing_indicator(&self, channel_id: &str) -> Result<(), ChatError> {
        self.transport
            .post_json(&self.api_url(&format!("/channels/{channel_id}/typing")), serde_json::Value::Null)
            .await?;
        Ok(())
    }
}

fn message_id_from_result(value: &serde_json::Value) -> Result<SentMessageId, ChatError> {
    value["id"]
        .as_str()
        .map(|id| SentMessageId(id.to_string()))
        .ok_or_else(|| ChatError::Transient("missing id in response".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::http::FakeHttpTransport;

    #[test]
    fn markdown_passes_through_unchanged() {
        let adapter = DiscordChatAdapter::new(FakeHttpTransport::new(), "t", "p");
        assert_eq!(adapter.to_platform_markdown("**bold**"), "**bold**");
    }
}
