// SPDX-License-Identifier: Apache-2.0

//! Fake chat adapter for engine tests: records every call instead of
//! performing I/O, mirroring `FakeSessionAdapter`'s call-log shape.

use super::{ChatAdapter, ChatError, SentMessageId};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use teleclaude_core::session::AdapterKey;

#[derive(Debug, Clone)]
pub enum ChatCall {
    SendMessage { channel_id: String, body: String },
    SendFile { channel_id: String, filename: String },
    SendVoice { channel_id: String },
    EditMessage { channel_id: String, message_id: String, body: String },
    EnsureChannel { session_label: String },
    UpdateTitle { channel_id: String, title: String },
    CloseChannel { channel_id: String },
    DeleteChannel { channel_id: String },
    TypingIndicator { channel_id: String },
}

#[derive(Clone)]
pub struct FakeChatAdapter {
    key: AdapterKey,
    calls: Arc<Mutex<Vec<ChatCall>>>,
    next_id: Arc<AtomicU64>,
    fail_next_send: Arc<Mutex<Option<ChatError>>>,
}

impl FakeChatAdapter {
    pub fn new(key: AdapterKey) -> Self {
        Self {
            key,
            calls: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            fail_next_send: Arc::new(Mutex::new(None)),
        }
    }

    pub fn calls(&self) -> Vec<ChatCall> {
        self.calls.lock().clone()
    }

    /// Makes the next `send_message` call fail with `err`, for testing
    /// outbox retry behavior.
    pub fn fail_next_send(&self, err: ChatError) {
        *self.fail_next_send.lock() = Some(err);
    }
}

fn fake_error(err: &ChatError) -> ChatError {
    match err {
        ChatError::ChannelNotFound(s) => ChatError::ChannelNotFound(s.clone()),
        ChatError::Transient(s) => ChatError::Transient(s.clone()),
        ChatError::PlatformConstraint(s) => ChatError::PlatformConstraint(s.clone()),
    }
}

#[async_trait]
impl ChatAdapter for FakeChatAdapter {
    fn adapter_key(&self) -> AdapterKey {
        self.key.clone()
    }

    fn max_message_length(&self) -> usize {
        4096
    }

    fn to_platform_markdown(&self, body: &str) -> String {
        body.to_string()
    }

    async fn send_message(&self, channel_id: &str, body: &str) -> Result<SentMessageId, ChatError> {
        if let Some(err) = self.fail_next_send.lock().take() {
            return Err(fake_error(&err));
        }
        self.calls.lock().push(ChatCall::SendMessage {
            channel_id: channel_id.to_string(),
            body: body.to_string(),
        });
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        Ok(SentMessageId(id))
    }

    async fn send_file(
        &self,
        channel_id: &str,
        filename: &str,
        _data: &[u8],
    ) -> Result<SentMessageId, ChatError> {
        self.calls.lock().push(ChatCall::SendFile {
            channel_id: channel_id.to_string(),
            filename: filename.to_string(),
        });
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        Ok(SentMessageId(id))
    }

    async fn send_voice(&self, channel_id: &str, _data: &[u8]) -> Result<SentMessageId, ChatError> {
        self.calls.lock().push(ChatCall::SendVoice {
            channel_id: channel_id.to_string(),
        });
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        Ok(SentMessageId(id))
    }

    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &SentMessageId,
        body: &str,
    ) -> Result<(), ChatError> {
        self.calls.lock().push(ChatCall::EditMessage {
            channel_id: channel_id.to_string(),
            message_id: message_id.0.clone(),
            body: body.to_string(),
        });
        Ok(())
    }

    async fn ensure_channel(&self, session_label: &str) -> Result<String, ChatError> {
        self.calls.lock().push(ChatCall::EnsureChannel {
            session_label: session_label.to_string(),
        });
        Ok(format!("chan-{session_label}"))
    }

    async fn update_title(&self, channel_id: &str, title: &str) -> Result<(), ChatError> {
        self.calls.lock().push(ChatCall::UpdateTitle {
            channel_id: channel_id.to_string(),
            title: title.to_string(),
        });
        Ok(())
    }

    async fn close_channel(&self, channel_id: &str) -> Result<(), ChatError> {
        self.calls.lock().push(ChatCall::CloseChannel {
            channel_id: channel_id.to_string(),
        });
        Ok(())
    }

    async fn delete_channel(&self, channel_id: &str) -> Result<(), ChatError> {
        self.calls.lock().push(ChatCall::DeleteChannel {
            channel_id: channel_id.to_string(),
        });
        Ok(())
    }

    async fn typing_indicator(&self, channel_id: &str) -> Result<(), ChatError> {
        self.calls.lock().push(ChatCall::TypingIndicator {
            channel_id: channel_id.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_calls_in_order() {
        let adapter = FakeChatAdapter::new(AdapterKey::Telegram);
        let channel = adapter.ensure_channel("s1").await.unwrap();
        adapter.send_message(&channel, "hi").await.unwrap();

        assert_eq!(adapter.calls().len(), 2);
    }

    #[tokio::test]
    async fn fail_next_send_returns_injected_error() {
        let adapter = FakeChatAdapter::new(AdapterKey::Discord);
        adapter.fail_next_send(ChatError::Transient("boom".into()));
        let err = adapter.send_message("c1", "hi").await.unwrap_err();
        assert!(matches!(err, ChatError::Transient(_)));
        assert!(adapter.calls().is_empty());
    }
}
