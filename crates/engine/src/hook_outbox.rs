// SPDX-License-Identifier: Apache-2.0

//! Hook outbox worker: same claim-and-ack discipline as the inbound
//! queue, but writers are short-lived hook-script processes rather than
//! adapters, so `enqueue_hook` takes a complete envelope instead of
//! building one up from a live request.

use crate::engine::Engine;
use crate::error::EngineError;
use chrono::Duration;
use teleclaude_adapters::SessionAdapter;
use teleclaude_core::backoff::backoff;
use teleclaude_core::event::Event;
use teleclaude_core::hook::{HookEnvelope, HookOutboxEntry, HookOutboxEntryId};
use teleclaude_core::id::IdGen;
use teleclaude_core::Clock;

const LOCK_TIMEOUT: i64 = 60;
pub const MAX_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone)]
pub struct ClaimedHook {
    pub id: HookOutboxEntryId,
    pub envelope: HookEnvelope,
    pub attempt_count: u32,
}

impl<S, G, C> Engine<S, G, C>
where
    S: SessionAdapter,
    G: IdGen,
    C: Clock,
{
    pub fn enqueue_hook(&self, envelope: HookEnvelope) -> Result<HookOutboxEntryId, EngineError> {
        let id = HookOutboxEntryId::new(self.id_gen.next());
        let entry = HookOutboxEntry::from_envelope(id.clone(), envelope.clone(), self.clock.now());

        self.apply(Event::HookEnqueued {
            session_id: envelope.session_id,
            event_type: envelope.event_type,
        })?;
        self.lock_state_mut(|state| state.insert_hook_entry(entry));
        Ok(id)
    }

    pub fn claim_hook_batch(&self, limit: usize) -> Result<Vec<ClaimedHook>, EngineError> {
        self.reclaim_stuck_hooks()?;

        let now = self.clock.now();
        let candidates: Vec<(HookOutboxEntryId, u32)> = self.lock_state(|state| {
            state
                .eligible_hook_outbox(now)
                .into_iter()
                .filter(|e| e.attempt_count < MAX_ATTEMPTS)
                .take(limit)
                .map(|e| (e.id.clone(), e.attempt_count + 1))
                .collect()
        });

        let mut claimed = Vec::with_capacity(candidates.len());
        for (id, attempt_count) in candidates {
            self.apply(Event::HookClaimed {
                id: id.clone(),
                attempt_count,
            })?;
            let entry = self
                .lock_state(|state| state.hook_outbox.get(&id).cloned())
                .ok_or_else(|| EngineError::not_found(&id))?;
            claimed.push(ClaimedHook {
                id: entry.id,
                envelope: HookEnvelope {
                    session_id: entry.session_id,
                    event_type: entry.event_type,
                    data: entry.payload_json,
                },
                attempt_count: entry.attempt_count,
            });
        }
        Ok(claimed)
    }

    fn reclaim_stuck_hooks(&self) -> Result<(), EngineError> {
        let now = self.clock.now();
        let cutoff = now - Duration::seconds(LOCK_TIMEOUT);
        let stuck: Vec<HookOutboxEntryId> = self.lock_state(|state| {
            state
                .hook_outbox
                .values()
                .filter(|e| !e.is_delivered() && e.locked_at.is_some_and(|t| t <= cutoff))
                .map(|e| e.id.clone())
                .collect()
        });
        for id in stuck {
            self.apply(Event::HookReclaimed { id })?;
        }
        Ok(())
    }

    pub fn complete_hook_success(&self, session_id: teleclaude_core::session::SessionId, event_type: teleclaude_core::hook::HookEventType) -> Result<(), EngineError> {
        self.apply(Event::HookDelivered { session_id, event_type })
    }

    pub fn complete_hook_failure(&self, id: &HookOutboxEntryId, error: impl Into<String>) -> Result<(), EngineError> {
        let attempt_count = self
            .lock_state(|state| state.hook_outbox.get(id).map(|e| e.attempt_count))
            .ok_or_else(|| EngineError::not_found(id))?;

        let next_attempt_at = if attempt_count >= MAX_ATTEMPTS {
            None
        } else {
            let delay = backoff(attempt_count);
            Some(self.clock.now() + Duration::from_std(delay).unwrap_or_else(|_| Duration::seconds(30)))
        };

        self.apply(Event::HookFailed {
            id: id.clone(),
            error: error.into(),
            next_attempt_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_engine;
    use teleclaude_core::hook::HookEventType;
    use teleclaude_core::session::SessionId;

    fn envelope() -> HookEnvelope {
        HookEnvelope {
            session_id: SessionId::new("s1"),
            event_type: HookEventType::Prompt,
            data: serde_json::Value::Null,
        }
    }

    #[test]
    fn enqueue_then_claim_then_deliver() {
        let engine = test_engine();
        engine.enqueue_hook(envelope()).unwrap();

        let claimed = engine.claim_hook_batch(10).unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].attempt_count, 1);

        engine
            .complete_hook_success(claimed[0].envelope.session_id.clone(), claimed[0].envelope.event_type)
            .unwrap();
        assert!(engine.claim_hook_batch(10).unwrap().is_empty());
    }

    #[test]
    fn stuck_hook_claims_are_reclaimed() {
        let engine = test_engine();
        engine.enqueue_hook(envelope()).unwrap();
        assert_eq!(engine.claim_hook_batch(10).unwrap().len(), 1);
        assert!(engine.claim_hook_batch(10).unwrap().is_empty());

        engine.clock.advance(chrono::Duration::seconds(LOCK_TIMEOUT + 1));
        let reclaimed = engine.claim_hook_batch(10).unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].attempt_count, 2);
    }

    #[test]
    fn failed_claims_stop_after_max_attempts() {
        let engine = test_engine();
        engine.enqueue_hook(envelope()).unwrap();

        let mut id = None;
        for _ in 0..MAX_ATTEMPTS {
            let claimed = engine.claim_hook_batch(10).unwrap();
            assert_eq!(claimed.len(), 1);
            id = Some(claimed[0].id.clone());
            engine.complete_hook_failure(id.as_ref().unwrap(), "boom").unwrap();
        }
        assert!(engine.claim_hook_batch(10).unwrap().is_empty());
    }
}
