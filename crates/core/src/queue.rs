// SPDX-License-Identifier: Apache-2.0

//! InboundQueueEntry: durable, at-least-once inbound ingestion.

use crate::session::{AdapterKey, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

crate::define_id! {
    pub struct InboundQueueEntryId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Voice,
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InboundQueueStatus {
    Pending,
    Processing,
    Delivered,
    Failed,
    Expired,
}

impl InboundQueueStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, InboundQueueStatus::Delivered | InboundQueueStatus::Expired)
    }
}

/// One inbound message awaiting dispatch into the command pipeline.
///
/// Dedup key: `(origin, source_message_id)` when `source_message_id` is
/// `Some` — enforced by a unique partial index in the state store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundQueueEntry {
    pub id: InboundQueueEntryId,
    pub session_id: SessionId,
    pub origin: AdapterKey,
    pub message_type: MessageType,
    pub content: String,
    #[serde(default)]
    pub payload_json: serde_json::Value,
    pub actor_id: String,
    pub actor_name: String,
    pub status: InboundQueueStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attempt_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_channel_id: Option<String>,
}

impl InboundQueueEntry {
    pub fn dedup_key(&self) -> Option<(AdapterKey, String)> {
        self.source_message_id
            .as_ref()
            .map(|id| (self.origin.clone(), id.clone()))
    }

    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, InboundQueueStatus::Pending | InboundQueueStatus::Failed)
            && self.next_retry_at.map(|t| t <= now).unwrap_or(true)
    }
}
