// SPDX-License-Identifier: Apache-2.0

//! Notification outbox: uniform outbox pattern for per-subscriber
//! notifications. Delivery itself (the HTTP call to WhatsApp/Telegram) is
//! the daemon transport layer's job; this module owns claim/ack/retry
//! bookkeeping only, the same split as `inbound_queue` and `hook_outbox`.

use crate::engine::Engine;
use crate::error::EngineError;
use chrono::{DateTime, Duration, Utc};
use teleclaude_adapters::SessionAdapter;
use teleclaude_core::backoff::backoff;
use teleclaude_core::event::Event;
use teleclaude_core::id::IdGen;
use teleclaude_core::outbox::{NotificationOutboxEntry, NotificationOutboxEntryId, OutboxStatus};
use teleclaude_core::Clock;

pub const MAX_ATTEMPTS: u32 = 10;
const LOCK_TIMEOUT: i64 = 60;

#[derive(Debug, Clone)]
pub struct ClaimedNotification {
    pub id: NotificationOutboxEntryId,
    pub channel: String,
    pub subscriber: String,
    pub body: String,
    pub attempt_count: u32,
}

impl<S, G, C> Engine<S, G, C>
where
    S: SessionAdapter,
    G: IdGen,
    C: Clock,
{
    /// One envelope per resolved subscriber.
    pub fn enqueue_notification(&self, channel: impl Into<String>, subscriber: impl Into<String>, body: impl Into<String>) -> NotificationOutboxEntryId {
        let id = NotificationOutboxEntryId::new(self.id_gen.next());
        let entry = NotificationOutboxEntry {
            id: id.clone(),
            channel: channel.into(),
            subscriber: subscriber.into(),
            body: body.into(),
            status: OutboxStatus::Pending,
            created_at: self.clock.now(),
            attempt_count: 0,
            next_attempt_at: None,
            locked_at: None,
            last_error: None,
            delivered_at: None,
        };
        self.lock_state_mut(|state| state.insert_notification_entry(entry));
        id
    }

    pub fn claim_notification_batch(&self, limit: usize) -> Result<Vec<ClaimedNotification>, EngineError> {
        self.reclaim_stuck_notifications();

        let now = self.clock.now();
        let candidates: Vec<(NotificationOutboxEntryId, u32)> = self.lock_state(|state| {
            state
                .eligible_notification_outbox(now)
                .into_iter()
                .filter(|e| e.attempt_count < MAX_ATTEMPTS)
                .take(limit)
                .map(|e| (e.id.clone(), e.attempt_count + 1))
                .collect()
        });

        let mut claimed = Vec::with_capacity(candidates.len());
        for (id, attempt_count) in candidates {
            self.apply(Event::NotificationClaimed {
                id: id.clone(),
                attempt_count,
            })?;
            let entry = self
                .lock_state(|state| state.notification_outbox.get(&id).cloned())
                .ok_or_else(|| EngineError::not_found(&id))?;
            claimed.push(ClaimedNotification {
                id: entry.id,
                channel: entry.channel,
                subscriber: entry.subscriber,
                body: entry.body,
                attempt_count: entry.attempt_count,
            });
        }
        Ok(claimed)
    }

    fn reclaim_stuck_notifications(&self) {
        let now = self.clock.now();
        let cutoff = now - Duration::seconds(LOCK_TIMEOUT);
        self.lock_state_mut(|state| {
            for entry in state.notification_outbox.values_mut() {
                if entry.status == OutboxStatus::Processing && entry.locked_at.is_some_and(|t| t <= cutoff) {
                    entry.status = OutboxStatus::Pending;
                    entry.locked_at = None;
                }
            }
        });
    }

    pub fn complete_notification_success(&self, id: &NotificationOutboxEntryId) -> Result<(), EngineError> {
        self.apply(Event::NotificationDelivered { id: id.clone() })
    }

    /// `retry_after` honors a 429 `Retry-After` header when present,
    /// overriding the computed backoff.
    pub fn complete_notification_failure(&self, id: &NotificationOutboxEntryId, error: impl Into<String>, retry_after: Option<DateTime<Utc>>) -> Result<(), EngineError> {
        let attempt_count = self
            .lock_state(|state| state.notification_outbox.get(id).map(|e| e.attempt_count))
            .ok_or_else(|| EngineError::not_found(id))?;

        let terminal = attempt_count >= MAX_ATTEMPTS;
        let next_attempt_at = if terminal {
            None
        } else {
            Some(retry_after.unwrap_or_else(|| {
                self.clock.now() + Duration::from_std(backoff(attempt_count)).unwrap_or_else(|_| Duration::seconds(30))
            }))
        };

        self.apply(Event::NotificationFailed {
            id: id.clone(),
            error: error.into(),
            next_attempt_at,
            terminal,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_engine;

    #[test]
    fn enqueue_then_claim_then_deliver() {
        let engine = test_engine();
        engine.enqueue_notification("ops", "+15551234567", "build failed");

        let claimed = engine.claim_notification_batch(10).unwrap();
        assert_eq!(claimed.len(), 1);
        engine.complete_notification_success(&claimed[0].id).unwrap();
        assert!(engine.claim_notification_batch(10).unwrap().is_empty());
    }

    #[test]
    fn failure_terminates_after_max_attempts() {
        let engine = test_engine();
        let id = engine.enqueue_notification("ops", "+1", "hi");

        for _ in 0..MAX_ATTEMPTS {
            let claimed = engine.claim_notification_batch(10).unwrap();
            assert_eq!(claimed.len(), 1);
            engine.complete_notification_failure(&id, "http 500", None).unwrap();
        }

        let entry = engine.lock_state(|s| s.notification_outbox.get(&id).cloned()).unwrap();
        assert_eq!(entry.status, OutboxStatus::Failed);
        assert!(engine.claim_notification_batch(10).unwrap().is_empty());
    }

    #[test]
    fn retry_after_overrides_computed_backoff() {
        let engine = test_engine();
        let id = engine.enqueue_notification("ops", "+1", "hi");
        engine.claim_notification_batch(10).unwrap();

        let retry_at = engine.clock.now() + chrono::Duration::seconds(120);
        engine.complete_notification_failure(&id, "429", Some(retry_at)).unwrap();

        let entry = engine.lock_state(|s| s.notification_outbox.get(&id).cloned()).unwrap();
        assert_eq!(entry.next_attempt_at, Some(retry_at));
    }
}
