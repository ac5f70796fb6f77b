// SPDX-License-Identifier: Apache-2.0

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! teleclaude-engine: the durable state machine every daemon worker drives.
//!
//! `Engine<S, G, C>` owns the WAL, the materialized state, and every adapter
//! registry. Each module here adds one family of operations to `Engine` via
//! an `impl` block rather than splitting the type itself, so a single `Arc`
//! handle gives a worker task everything it needs.

mod agent_event_handler;
mod engine;
mod error;
mod fanout_router;
mod hook_outbox;
mod inbound_queue;
mod link_registry;
mod listener_bus;
mod notification_outbox;
mod output_poller;
mod session_registry;
mod webhook_outbox;

#[cfg(test)]
mod test_support;

pub use engine::Engine;
pub use error::EngineError;
pub use hook_outbox::ClaimedHook;
pub use inbound_queue::{ClaimedInbound, EnqueueInbound};
pub use notification_outbox::ClaimedNotification;
pub use session_registry::{CreateSessionSpec, SessionFilter, SessionPatch};
pub use webhook_outbox::ClaimedWebhook;
