// SPDX-License-Identifier: Apache-2.0

//! In-process chat adapter for the adapters that have no network
//! transport of their own: Web (served by the daemon's own HTTP
//! surface), Tui (attached directly to the daemon), and Mcp (an MCP
//! client driving the daemon locally). Each just stores messages in
//! memory for the attached client to poll or stream.

use super::{ChatAdapter, ChatError, SentMessageId};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use teleclaude_core::session::AdapterKey;

#[derive(Debug, Clone)]
pub struct LoopbackMessage {
    pub id: String,
    pub body: String,
}

struct LoopbackState {
    channels: HashMap<String, Vec<LoopbackMessage>>,
    titles: HashMap<String, String>,
}

#[derive(Clone)]
pub struct LoopbackChatAdapter {
    key: AdapterKey,
    state: Arc<Mutex<LoopbackState>>,
    next_id: Arc<AtomicU64>,
    max_message_length: usize,
}

impl LoopbackChatAdapter {
    pub fn new(key: AdapterKey) -> Self {
        Self {
            key,
            state: Arc::new(Mutex::new(LoopbackState {
                channels: HashMap::new(),
                titles: HashMap::new(),
            })),
            next_id: Arc::new(AtomicU64::new(1)),
            max_message_length: 64 * 1024,
        }
    }

    pub fn messages(&self, channel_id: &str) -> Vec<LoopbackMessage> {
        self.state
            .lock()
            .channels
            .get(channel_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn title(&self, channel_id: &str) -> Option<String> {
        self.state.lock().titles.get(channel_id).cloned()
    }

    fn next_message_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::SeqCst).to_string()
    }
}

#[async_trait]
impl ChatAdapter for LoopbackChatAdapter {
    fn adapter_key(&self) -> AdapterKey {
        self.key.clone()
    }

    fn max_message_length(&self) -> usize {
        self.max_message_length
    }

    fn to_platform_markdown(&self, body: &str) -> String {
        body.to_string()
    }

    async fn send_message(&self, channel_id: &str, body: &str) -> Result<SentMessageId, ChatError> {
        let id = self.next_message_id();
        self.state
            .lock()
            .channels
            .entry(channel_id.to_string())
            .or_default()
            .push(LoopbackMessage {
                id: id.clone(),
                body: body.to_string(),
            });
        Ok(SentMessageId(id))
    }

    async fn send_file(
        &self,
        channel_id: &str,
        filename: &str,
        data: &[u8],
    ) -> Result<SentMessageId, ChatError> {
        self.send_message(channel_id, &format!("[file:{filename}, {} bytes]", data.len()))
            .await
    }

    async fn send_voice(&self, channel_id: &str, data: &[u8]) -> Result<SentMessageId, ChatError> {
        self.send_message(channel_id, &format!("[voice, {} bytes]", data.len()))
            .await
    }

    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &SentMessageId,
        body: &str,
    ) -> Result<(), ChatError> {
        let mut state = self.state.lock();
        let messages = state
            .channels
            .get_mut(channel_id)
            .ok_or_else(|| ChatError::ChannelNotFound(channel_id.to_string()))?;
        let message = messages
            .iter_mut()
            .find(|m| m.id == message_id.0)
            .ok_or_else(|| ChatError::ChannelNotFound(message_id.0.clone()))?;
        message.body = body.to_string();
        Ok(())
    }

    async fn ensure_channel(&self, session_label: &str) -> Result<String, ChatError> {
        self.state
            .lock()
            .channels
            .entry(session_label.to_string())
            .or_default();
        Ok(session_label.to_string())
    }

    async fn update_title(&self, channel_id: &str, title: &str) -> Result<(), ChatError> {
        self.state
            .lock()
            .titles
            .insert(channel_id.to_string(), title.to_string());
        Ok(())
    }

    async fn close_channel(&self, _channel_id: &str) -> Result<(), ChatError> {
        Ok(())
    }

    async fn delete_channel(&self, channel_id: &str) -> Result<(), ChatError> {
        self.state.lock().channels.remove(channel_id);
        Ok(())
    }

    async fn typing_indicator(&self, _channel_id: &str) -> Result<(), ChatError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_then_edit_message() {
        let adapter = LoopbackChatAdapter::new(AdapterKey::Tui);
        let channel = adapter.ensure_channel("session-a").await.unwrap();
        let id = adapter.send_message(&channel, "hello").await.unwrap();
        adapter.edit_message(&channel, &id, "hello again").await.unwrap();

        let messages = adapter.messages(&channel);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].body, "hello again");
    }

    #[tokio::test]
    async fn delete_channel_clears_history() {
        let adapter = LoopbackChatAdapter::new(AdapterKey::Web);
        let channel = adapter.ensure_channel("session-b").await.unwrap();
        adapter.send_message(&channel, "hi").await.unwrap();
        adapter.delete_channel(&channel).await.unwrap();
        assert!(adapter.messages(&channel).is_empty());
    }
}
