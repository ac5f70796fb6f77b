// SPDX-License-Identifier: Apache-2.0

//! NotificationOutbox / WebhookOutbox: uniform durable outbound envelopes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

crate::define_id! {
    pub struct NotificationOutboxEntryId;
}

crate::define_id! {
    pub struct WebhookOutboxEntryId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Processing,
    Delivered,
    Failed,
}

impl OutboxStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OutboxStatus::Delivered | OutboxStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationOutboxEntry {
    pub id: NotificationOutboxEntryId,
    /// Logical notification channel name (from `notifications.channels` config).
    pub channel: String,
    /// Resolved subscriber identity (WhatsApp phone / Telegram chat id / etc).
    pub subscriber: String,
    pub body: String,
    pub status: OutboxStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub attempt_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookOutboxEntry {
    pub id: WebhookOutboxEntryId,
    pub target_url: String,
    pub payload_json: serde_json::Value,
    pub status: OutboxStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub attempt_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
}

/// Shared claim/ack discipline for any outbox-shaped row — implemented by
/// both outbox entry types so worker loops can be written generically.
pub trait OutboxEntry {
    fn status(&self) -> OutboxStatus;
    fn set_status(&mut self, status: OutboxStatus);
    fn attempt_count(&self) -> u32;
    fn increment_attempt(&mut self);
    fn set_next_attempt_at(&mut self, at: Option<DateTime<Utc>>);
    fn next_attempt_at(&self) -> Option<DateTime<Utc>>;
    fn set_locked_at(&mut self, at: Option<DateTime<Utc>>);
    fn locked_at(&self) -> Option<DateTime<Utc>>;
    fn set_last_error(&mut self, err: Option<String>);
    fn set_delivered_at(&mut self, at: Option<DateTime<Utc>>);

    fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        !self.status().is_terminal() && self.next_attempt_at().map(|t| t <= now).unwrap_or(true)
    }
}

macro_rules! impl_outbox_entry {
    ($ty:ty) => {
        impl OutboxEntry for $ty {
            fn status(&self) -> OutboxStatus {
                self.status
            }
            fn set_status(&mut self, status: OutboxStatus) {
                self.status = status;
            }
            fn attempt_count(&self) -> u32 {
                self.attempt_count
            }
            fn increment_attempt(&mut self) {
                self.attempt_count += 1;
            }
            fn set_next_attempt_at(&mut self, at: Option<DateTime<Utc>>) {
                self.next_attempt_at = at;
            }
            fn next_attempt_at(&self) -> Option<DateTime<Utc>> {
                self.next_attempt_at
            }
            fn set_locked_at(&mut self, at: Option<DateTime<Utc>>) {
                self.locked_at = at;
            }
            fn locked_at(&self) -> Option<DateTime<Utc>> {
                self.locked_at
            }
            fn set_last_error(&mut self, err: Option<String>) {
                self.last_error = err;
            }
            fn set_delivered_at(&mut self, at: Option<DateTime<Utc>>) {
                self.delivered_at = at;
            }
        }
    };
}

impl_outbox_entry!(NotificationOutboxEntry);
impl_outbox_entry!(WebhookOutboxEntry);
