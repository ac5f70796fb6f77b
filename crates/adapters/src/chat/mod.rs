// SPDX-License-Identifier: Apache-2.0

//! Chat adapters: one implementation per platform an `AdapterKey` can
//! name (Telegram, Discord, WhatsApp, Web, Tui, Mcp).
//!
//! `ChatAdapter` is an explicit capability trait rather than a
//! duck-typed "send to whatever platform object is attached" seam:
//! every method here is something a platform must support to
//! participate in output fanout, nothing more. Telegram, Discord, and
//! WhatsApp implement the trait shape against real bot APIs but are
//! generic over `HttpTransport` with no concrete network-backed
//! transport wired in this crate; a deployment that wants one brings
//! its own.

mod discord;
mod http;
mod loopback;
mod telegram;
mod whatsapp;

pub use discord::DiscordChatAdapter;
pub use http::HttpTransport;
pub use loopback::LoopbackChatAdapter;
pub use telegram::TelegramChatAdapter;
pub use whatsapp::WhatsAppChatAdapter;

#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{ChatCall, FakeChatAdapter};

use async_trait::async_trait;
use teleclaude_core::session::AdapterKey;
use thiserror::Error;

use http::HttpError;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("channel not found: {0}")]
    ChannelNotFound(String),
    #[error("transient transport failure: {0}")]
    Transient(String),
    #[error("platform constraint violated: {0}")]
    PlatformConstraint(String),
}

impl From<HttpError> for ChatError {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::Status { status, body } if status == 429 || status >= 500 => {
                ChatError::Transient(body)
            }
            HttpError::Status { body, .. } => ChatError::PlatformConstraint(body),
            HttpError::Request(msg) => ChatError::Transient(msg),
        }
    }
}

/// Opaque handle to a sent message, returned so callers can later
/// `edit_message` it in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessageId(pub String);

/// The capability set a chat platform exposes to the fanout router.
#[async_trait]
pub trait ChatAdapter: Send + Sync + 'static {
    fn adapter_key(&self) -> AdapterKey;

    /// Platform message-length ceiling, used to decide when output must
    /// be chunked before sending.
    fn max_message_length(&self) -> usize;

    /// Render session output in this platform's markup dialect. A
    /// platform that can't render markup at all should return `body`
    /// unchanged.
    fn to_platform_markdown(&self, body: &str) -> String;

    async fn send_message(&self, channel_id: &str, body: &str) -> Result<SentMessageId, ChatError>;

    async fn send_file(
        &self,
        channel_id: &str,
        filename: &str,
        data: &[u8],
    ) -> Result<SentMessageId, ChatError>;

    async fn send_voice(&self, channel_id: &str, data: &[u8]) -> Result<SentMessageId, ChatError>;

    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &SentMessageId,
        body: &str,
    ) -> Result<(), ChatError>;

    /// Create (or return the existing) channel/topic/thread for a
    /// session, idempotent per session.
    async fn ensure_channel(&self, session_label: &str) -> Result<String, ChatError>;

    async fn update_title(&self, channel_id: &str, title: &str) -> Result<(), ChatError>;

    /// Archive/close a channel without deleting history.
    async fn close_channel(&self, channel_id: &str) -> Result<(), ChatError>;

    async fn delete_channel(&self, channel_id: &str) -> Result<(), ChatError>;

    async fn typing_indicator(&self, channel_id: &str) -> Result<(), ChatError>;
}
