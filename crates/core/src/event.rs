// SPDX-License-Identifier: Apache-2.0

//! Event: state transitions applied to the materialized state store.
//!
//! Every worker and handler in `teleclaude-engine` produces `Event`s rather
//! than mutating state directly; the WAL persists them before the in-memory
//! `MaterializedState` applies them, giving the daemon crash recovery via
//! replay.
//!
//! Serializes with `{"type": "session:created", ...fields}` format. Unknown
//! type tags deserialize to `Custom` so forward compatibility across daemon
//! versions doesn't require a WAL migration.

use crate::hook::HookEventType;
use crate::link::{LinkId, LinkMode};
use crate::queue::{InboundQueueEntryId, InboundQueueStatus, MessageType};
use crate::session::{AdapterKey, SessionId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // -- session registry --
    #[serde(rename = "session:created")]
    SessionCreated { session_id: SessionId, computer_name: String },

    #[serde(rename = "session:input_admitted")]
    SessionInputAdmitted {
        session_id: SessionId,
        origin: AdapterKey,
        at_epoch_ms: i64,
    },

    #[serde(rename = "session:closed")]
    SessionClosed { session_id: SessionId, reason: String },

    #[serde(rename = "session:char_offset_advanced")]
    CharOffsetAdvanced { session_id: SessionId, delta: u64 },

    #[serde(rename = "session:char_offset_reset")]
    CharOffsetReset { session_id: SessionId },

    /// Records the channel/topic/thread id `ensure_channel` returned for an
    /// adapter.
    #[serde(rename = "session:channel_bound")]
    ChannelBound {
        session_id: SessionId,
        adapter: AdapterKey,
        channel_id: String,
    },

    /// Standard-mode output poller: the "live" message an adapter now
    /// edits in place.
    #[serde(rename = "session:output_message_bound")]
    OutputMessageBound {
        session_id: SessionId,
        adapter: AdapterKey,
        message_id: String,
    },

    // -- inbound queue --
    #[serde(rename = "inbound:enqueued")]
    InboundEnqueued {
        id: InboundQueueEntryId,
        session_id: SessionId,
        origin: AdapterKey,
        message_type: MessageType,
        content: String,
        #[serde(default)]
        source_message_id: Option<String>,
    },

    #[serde(rename = "inbound:claimed")]
    InboundClaimed { id: InboundQueueEntryId, attempt_count: u32 },

    #[serde(rename = "inbound:completed")]
    InboundCompleted {
        id: InboundQueueEntryId,
        status: InboundQueueStatus,
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        next_retry_at: Option<chrono::DateTime<chrono::Utc>>,
    },

    // -- hook outbox --
    #[serde(rename = "hook:enqueued")]
    HookEnqueued { session_id: SessionId, event_type: HookEventType },

    #[serde(rename = "hook:claimed")]
    HookClaimed {
        id: crate::hook::HookOutboxEntryId,
        attempt_count: u32,
    },

    #[serde(rename = "hook:delivered")]
    HookDelivered { session_id: SessionId, event_type: HookEventType },

    #[serde(rename = "hook:failed")]
    HookFailed {
        id: crate::hook::HookOutboxEntryId,
        error: String,
        #[serde(default)]
        next_attempt_at: Option<chrono::DateTime<chrono::Utc>>,
    },

    #[serde(rename = "hook:reclaimed")]
    HookReclaimed { id: crate::hook::HookOutboxEntryId },

    // -- agent event handler --
    #[serde(rename = "agent:started")]
    AgentStarted {
        session_id: SessionId,
        native_session_id: String,
        #[serde(default)]
        transcript_path: Option<std::path::PathBuf>,
    },

    #[serde(rename = "agent:prompt_recorded")]
    PromptRecorded {
        session_id: SessionId,
        content: String,
        at: chrono::DateTime<chrono::Utc>,
    },

    #[serde(rename = "agent:stopped")]
    AgentStopped {
        session_id: SessionId,
        /// True when the output matched the checkpoint pattern.
        checkpoint: bool,
        #[serde(default)]
        last_output_summary: Option<String>,
    },

    // -- voice assignment --
    #[serde(rename = "voice:seeded")]
    VoiceAssignmentSeeded {
        key: String,
        service_name: String,
        voice: String,
        created_at: chrono::DateTime<chrono::Utc>,
    },

    #[serde(rename = "voice:upgraded")]
    VoiceAssignmentUpgraded { old_key: String, new_key: String },

    // -- conversation links --
    #[serde(rename = "link:created")]
    LinkCreated {
        link_id: LinkId,
        mode: LinkMode,
        created_by_session_id: SessionId,
    },

    #[serde(rename = "link:member_added")]
    LinkMemberAdded { link_id: LinkId, session_id: SessionId },

    #[serde(rename = "link:member_removed")]
    LinkMemberRemoved { link_id: LinkId, session_id: SessionId },

    #[serde(rename = "link:closed")]
    LinkClosed { link_id: LinkId },

    // -- session listener bus --
    #[serde(rename = "listener:registered")]
    ListenerRegistered { target_session_id: SessionId, caller_session_id: SessionId },

    #[serde(rename = "listener:fired")]
    ListenerFired { target_session_id: SessionId, caller_session_id: SessionId },

    #[serde(rename = "listener:swept")]
    ListenerSwept { session_id: SessionId },

    // -- notification & webhook outboxes --
    #[serde(rename = "notification:claimed")]
    NotificationClaimed {
        id: crate::outbox::NotificationOutboxEntryId,
        attempt_count: u32,
    },

    #[serde(rename = "notification:delivered")]
    NotificationDelivered { id: crate::outbox::NotificationOutboxEntryId },

    #[serde(rename = "notification:failed")]
    NotificationFailed {
        id: crate::outbox::NotificationOutboxEntryId,
        error: String,
        #[serde(default)]
        next_attempt_at: Option<chrono::DateTime<chrono::Utc>>,
        terminal: bool,
    },

    #[serde(rename = "webhook:claimed")]
    WebhookClaimed {
        id: crate::outbox::WebhookOutboxEntryId,
        attempt_count: u32,
    },

    #[serde(rename = "webhook:delivered")]
    WebhookDelivered { id: crate::outbox::WebhookOutboxEntryId },

    #[serde(rename = "webhook:failed")]
    WebhookFailed {
        id: crate::outbox::WebhookOutboxEntryId,
        error: String,
        #[serde(default)]
        next_attempt_at: Option<chrono::DateTime<chrono::Utc>>,
        terminal: bool,
    },

    /// Escape hatch for forward-compatible WAL replay across daemon versions.
    #[serde(other)]
    Custom,
}

impl Event {
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            Event::SessionCreated { session_id, .. }
            | Event::SessionInputAdmitted { session_id, .. }
            | Event::SessionClosed { session_id, .. }
            | Event::CharOffsetAdvanced { session_id, .. }
            | Event::CharOffsetReset { session_id }
            | Event::InboundEnqueued { session_id, .. }
            | Event::HookEnqueued { session_id, .. }
            | Event::HookDelivered { session_id, .. }
            | Event::AgentStarted { session_id, .. }
            | Event::PromptRecorded { session_id, .. }
            | Event::AgentStopped { session_id, .. }
            | Event::ListenerSwept { session_id } => Some(session_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let ev = Event::SessionClosed {
            session_id: SessionId::new("s1"),
            reason: "idle_sweep".to_string(),
        };
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("\"type\":\"session:closed\""));
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(ev, back);
    }

    #[test]
    fn unknown_tag_falls_back_to_custom() {
        let json = r#"{"type":"something:future"}"#;
        let ev: Event = serde_json::from_str(json).unwrap();
        assert_eq!(ev, Event::Custom);
    }
}
