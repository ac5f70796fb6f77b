// SPDX-License-Identifier: Apache-2.0

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Adapters for external I/O: the tmux pane a session drives (`session`),
//! transcript parsing (`agent`), and the chat platforms a session fans
//! out to (`chat`).

pub mod agent;
pub mod chat;
pub mod session;

pub use agent::{Summarizer, TranscriptParser, TranscriptSummary};
pub use chat::{ChatAdapter, ChatError, HttpTransport, LoopbackChatAdapter, SentMessageId};
pub use session::{NoOpSessionAdapter, SessionAdapter, SessionError, TmuxAdapter};

#[cfg(any(test, feature = "test-support"))]
pub use agent::{FakeSummarizer, FakeTranscriptParser};
#[cfg(any(test, feature = "test-support"))]
pub use chat::{ChatCall, FakeChatAdapter};
#[cfg(any(test, feature = "test-support"))]
pub use session::{FakeSession, FakeSessionAdapter, SessionCall};
