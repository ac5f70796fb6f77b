// SPDX-License-Identifier: Apache-2.0

//! Webhook outbox: same uniform outbox pattern as `notification_outbox`,
//! for arbitrary outbound webhook deliveries (deploy-status broadcasts,
//! third-party integrations).

use crate::engine::Engine;
use crate::error::EngineError;
use chrono::{DateTime, Duration, Utc};
use teleclaude_adapters::SessionAdapter;
use teleclaude_core::backoff::backoff;
use teleclaude_core::event::Event;
use teleclaude_core::id::IdGen;
use teleclaude_core::outbox::{OutboxStatus, WebhookOutboxEntry, WebhookOutboxEntryId};
use teleclaude_core::Clock;

pub const MAX_ATTEMPTS: u32 = 10;
const LOCK_TIMEOUT: i64 = 60;

#[derive(Debug, Clone)]
pub struct ClaimedWebhook {
    pub id: WebhookOutboxEntryId,
    pub target_url: String,
    pub payload_json: serde_json::Value,
    pub attempt_count: u32,
}

impl<S, G, C> Engine<S, G, C>
where
    S: SessionAdapter,
    G: IdGen,
    C: Clock,
{
    pub fn enqueue_webhook(&self, target_url: impl Into<String>, payload_json: serde_json::Value) -> WebhookOutboxEntryId {
        let id = WebhookOutboxEntryId::new(self.id_gen.next());
        let entry = WebhookOutboxEntry {
            id: id.clone(),
            target_url: target_url.into(),
            payload_json,
            status: OutboxStatus::Pending,
            created_at: self.clock.now(),
            attempt_count: 0,
            next_attempt_at: None,
            locked_at: None,
            last_error: None,
            delivered_at: None,
        };
        self.lock_state_mut(|state| state.insert_webhook_entry(entry));
        id
    }

    pub fn claim_webhook_batch(&self, limit: usize) -> Result<Vec<ClaimedWebhook>, EngineError> {
        self.reclaim_stuck_webhooks();

        let now = self.clock.now();
        let candidates: Vec<(WebhookOutboxEntryId, u32)> = self.lock_state(|state| {
            state
                .eligible_webhook_outbox(now)
                .into_iter()
                .filter(|e| e.attempt_count < MAX_ATTEMPTS)
                .take(limit)
                .map(|e| (e.id.clone(), e.attempt_count + 1))
                .collect()
        });

        let mut claimed = Vec::with_capacity(candidates.len());
        for (id, attempt_count) in candidates {
            self.apply(Event::WebhookClaimed {
                id: id.clone(),
                attempt_count,
            })?;
            let entry = self
                .lock_state(|state| state.webhook_outbox.get(&id).cloned())
                .ok_or_else(|| EngineError::not_found(&id))?;
            claimed.push(ClaimedWebhook {
                id: entry.id,
                target_url: entry.target_url,
                payload_json: entry.payload_json,
                attempt_count: entry.attempt_count,
            });
        }
        Ok(claimed)
    }

    fn reclaim_stuck_webhooks(&self) {
        let now = self.clock.now();
        let cutoff = now - Duration::seconds(LOCK_TIMEOUT);
        self.lock_state_mut(|state| {
            for entry in state.webhook_outbox.values_mut() {
                if entry.status == OutboxStatus::Processing && entry.locked_at.is_some_and(|t| t <= cutoff) {
                    entry.status = OutboxStatus::Pending;
                    entry.locked_at = None;
                }
            }
        });
    }

    pub fn complete_webhook_success(&self, id: &WebhookOutboxEntryId) -> Result<(), EngineError> {
        self.apply(Event::WebhookDelivered { id: id.clone() })
    }

    pub fn complete_webhook_failure(&self, id: &WebhookOutboxEntryId, error: impl Into<String>, retry_after: Option<DateTime<Utc>>) -> Result<(), EngineError> {
        let attempt_count = self
            .lock_state(|state| state.webhook_outbox.get(id).map(|e| e.attempt_count))
            .ok_or_else(|| EngineError::not_found(id))?;

        let terminal = attempt_count >= MAX_ATTEMPTS;
        let next_attempt_at = if terminal {
            None
        } else {
            Some(retry_after.unwrap_or_else(|| {
                self.clock.now() + Duration::from_std(backoff(attempt_count)).unwrap_or_else(|_| Duration::seconds(30))
            }))
        };

        self.apply(Event::WebhookFailed {
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
        engine.enqueue_webhook("https://example.com/hook", serde_json::json!({"status": "deployed"}));

        let claimed = engine.claim_webhook_batch(10).unwrap();
        assert_eq!(claimed.len(), 1);
        engine.complete_webhook_success(&claimed[0].id).unwrap();
        assert!(engine.claim_webhook_batch(10).unwrap().is_empty());
    }

    #[test]
    fn failure_terminates_after_max_attempts() {
        let engine = test_engine();
        let id = engine.enqueue_webhook("https://example.com/hook", serde_json::Value::Null);

        for _ in 0..MAX_ATTEMPTS {
            let claimed = engine.claim_webhook_batch(10).unwrap();
            assert_eq!(claimed.len(), 1);
            engine.complete_webhook_failure(&id, "connection reset", None).unwrap();
        }

        let entry = engine.lock_state(|s| s.webhook_outbox.get(&id).cloned()).unwrap();
        assert_eq!(entry.status, OutboxStatus::Failed);
    }
}
