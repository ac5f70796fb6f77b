// SPDX-License-Identifier: Apache-2.0

//! HookOutboxEntry and the hook event envelope.

use crate::session::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

crate::define_id! {
    pub struct HookOutboxEntryId;
}

/// Normalized hook event type, after mapping from the per-agent hook name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookEventType {
    SessionStart,
    Prompt,
    Stop,
    Notification,
    SessionEnd,
}

/// The envelope written by short-lived hook-script processes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookEnvelope {
    pub session_id: SessionId,
    pub event_type: HookEventType,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Durable record of a hook envelope, drained by the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookOutboxEntry {
    pub id: HookOutboxEntryId,
    pub session_id: SessionId,
    pub event_type: HookEventType,
    #[serde(default)]
    pub payload_json: serde_json::Value,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attempt_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_at: Option<DateTime<Utc>>,
}

impl HookOutboxEntry {
    pub fn from_envelope(id: HookOutboxEntryId, envelope: HookEnvelope, now: DateTime<Utc>) -> Self {
        Self {
            id,
            session_id: envelope.session_id,
            event_type: envelope.event_type,
            payload_json: envelope.data,
            created_at: now,
            next_attempt_at: None,
            attempt_count: 0,
            last_error: None,
            delivered_at: None,
            locked_at: None,
        }
    }

    pub fn is_delivered(&self) -> bool {
        self.delivered_at.is_some()
    }

    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        !self.is_delivered() && self.next_attempt_at.map(|t| t <= now).unwrap_or(true)
    }
}
