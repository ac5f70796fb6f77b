// SPDX-License-Identifier: Apache-2.0

//! Inbound queue and worker: durable admission of chat messages into the
//! engine, claimed and retried independently of the adapter that received
//! them.

use crate::engine::Engine;
use crate::error::EngineError;
use chrono::Duration;
use teleclaude_adapters::SessionAdapter;
use teleclaude_core::backoff::backoff;
use teleclaude_core::event::Event;
use teleclaude_core::id::IdGen;
use teleclaude_core::queue::{InboundQueueEntryId, InboundQueueStatus, MessageType};
use teleclaude_core::session::{AdapterKey, SessionId};
use teleclaude_core::Clock;

/// Entries stuck in `processing` longer than this are assumed to belong to
/// a worker that crashed mid-dispatch and are reclaimed.
const LOCK_TIMEOUT: i64 = 60;

/// Terminal attempt count: rows at or past this are `expired`, never
/// re-selected by the claim query.
pub const MAX_ATTEMPTS: u32 = 10;

/// Input to `enqueue`.
#[derive(Debug, Clone)]
pub struct EnqueueInbound {
    pub session_id: SessionId,
    pub origin: AdapterKey,
    pub message_type: MessageType,
    pub content: String,
    pub source_message_id: Option<String>,
}

/// A batch-claimed entry, handed to the Agent Event Handler / command
/// pipeline for dispatch.
#[derive(Debug, Clone)]
pub struct ClaimedInbound {
    pub id: InboundQueueEntryId,
    pub session_id: SessionId,
    pub origin: AdapterKey,
    pub message_type: MessageType,
    pub content: String,
    pub attempt_count: u32,
}

impl<S, G, C> Engine<S, G, C>
where
    S: SessionAdapter,
    G: IdGen,
    C: Clock,
{
    /// Idempotent ingest: a duplicate `(origin, source_message_id)` pair
    /// returns the existing row's id rather than inserting a second one.
    pub fn enqueue_inbound(&self, input: EnqueueInbound) -> Result<InboundQueueEntryId, EngineError> {
        if let Some(ref source_message_id) = input.source_message_id {
            let existing = self.lock_state(|state| {
                state
                    .inbound_queue
                    .values()
                    .find(|e| {
                        e.dedup_key()
                            .is_some_and(|(o, id)| o == input.origin && &id == source_message_id)
                    })
                    .map(|e| e.id.clone())
            });
            if let Some(id) = existing {
                return Ok(id);
            }
        }

        let id = InboundQueueEntryId::new(self.id_gen.next());
        self.apply(Event::InboundEnqueued {
            id: id.clone(),
            session_id: input.session_id,
            origin: input.origin,
            message_type: input.message_type,
            content: input.content,
            source_message_id: input.source_message_id,
        })?;
        Ok(id)
    }

    /// Reclaim rows abandoned mid-dispatch, then claim up to `limit`
    /// eligible rows ordered by `created_at`.
    pub fn claim_inbound_batch(&self, limit: usize) -> Result<Vec<ClaimedInbound>, EngineError> {
        self.reclaim_stuck_inbound()?;

        let now = self.clock.now();
        let candidates: Vec<(InboundQueueEntryId, u32)> = self.lock_state(|state| {
            state
                .eligible_inbound(now)
                .into_iter()
                .filter(|e| e.attempt_count < MAX_ATTEMPTS)
                .take(limit)
                .map(|e| (e.id.clone(), e.attempt_count + 1))
                .collect()
        });

        let mut claimed = Vec::with_capacity(candidates.len());
        for (id, attempt_count) in candidates {
            self.apply(Event::InboundClaimed {
                id: id.clone(),
                attempt_count,
            })?;
            let entry = self
                .lock_state(|state| state.inbound_queue.get(&id).cloned())
                .ok_or_else(|| EngineError::not_found(&id))?;
            claimed.push(ClaimedInbound {
                id: entry.id,
                session_id: entry.session_id,
                origin: entry.origin,
                message_type: entry.message_type,
                content: entry.content,
                attempt_count: entry.attempt_count,
            });
        }
        Ok(claimed)
    }

    fn reclaim_stuck_inbound(&self) -> Result<(), EngineError> {
        let now = self.clock.now();
        let cutoff = now - Duration::seconds(LOCK_TIMEOUT);
        let stuck: Vec<InboundQueueEntryId> = self.lock_state(|state| {
            state
                .inbound_queue
                .values()
                .filter(|e| e.status == InboundQueueStatus::Processing && e.locked_at.is_some_and(|t| t <= cutoff))
                .map(|e| e.id.clone())
                .collect()
        });
        for id in stuck {
            self.apply(Event::InboundCompleted {
                id,
                status: InboundQueueStatus::Failed,
                error: Some("lock_timeout reclaimed".to_string()),
                next_retry_at: None,
            })?;
        }
        Ok(())
    }

    pub fn complete_inbound_success(&self, id: &InboundQueueEntryId) -> Result<(), EngineError> {
        self.apply(Event::InboundCompleted {
            id: id.clone(),
            status: InboundQueueStatus::Delivered,
            error: None,
            next_retry_at: None,
        })
    }

    /// On failure: retry with backoff until `MAX_ATTEMPTS`, then `expired`.
    pub fn complete_inbound_failure(&self, id: &InboundQueueEntryId, error: impl Into<String>) -> Result<(), EngineError> {
        let attempt_count = self
            .lock_state(|state| state.inbound_queue.get(id).map(|e| e.attempt_count))
            .ok_or_else(|| EngineError::not_found(id))?;

        let (status, next_retry_at) = if attempt_count >= MAX_ATTEMPTS {
            (InboundQueueStatus::Expired, None)
        } else {
            let delay = backoff(attempt_count);
            let retry_at = self.clock.now()
                + Duration::from_std(delay).unwrap_or_else(|_| Duration::seconds(30));
            (InboundQueueStatus::Failed, Some(retry_at))
        };

        self.apply(Event::InboundCompleted {
            id: id.clone(),
            status,
            error: Some(error.into()),
            next_retry_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session_registry::CreateSessionSpec;
    use crate::test_support::test_engine;
    use std::path::PathBuf;

    fn seed_session(engine: &crate::test_support::TestEngine) -> SessionId {
        engine
            .create_session(CreateSessionSpec {
                computer_name: "host-a".into(),
                project_path: PathBuf::from("/repo"),
                tmux_session_name: None,
                initiator_session_id: None,
                human_email: None,
                human_role: None,
            })
            .unwrap()
            .id
    }

    #[test]
    fn duplicate_source_message_id_returns_existing_id() {
        let engine = test_engine();
        let session_id = seed_session(&engine);

        let first = engine
            .enqueue_inbound(EnqueueInbound {
                session_id: session_id.clone(),
                origin: AdapterKey::Telegram,
                message_type: MessageType::Text,
                content: "hi".into(),
                source_message_id: Some("m1".into()),
            })
            .unwrap();
        let second = engine
            .enqueue_inbound(EnqueueInbound {
                session_id,
                origin: AdapterKey::Telegram,
                message_type: MessageType::Text,
                content: "hi again".into(),
                source_message_id: Some("m1".into()),
            })
            .unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn claim_batch_transitions_to_processing_and_increments_attempt() {
        let engine = test_engine();
        let session_id = seed_session(&engine);
        engine
            .enqueue_inbound(EnqueueInbound {
                session_id,
                origin: AdapterKey::Discord,
                message_type: MessageType::Text,
                content: "hello".into(),
                source_message_id: None,
            })
            .unwrap();

        let claimed = engine.claim_inbound_batch(10).unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].attempt_count, 1);

        assert!(engine.claim_inbound_batch(10).unwrap().is_empty());
    }

    #[test]
    fn expired_entries_are_never_reselected() {
        let engine = test_engine();
        let session_id = seed_session(&engine);
        let id = engine
            .enqueue_inbound(EnqueueInbound {
                session_id,
                origin: AdapterKey::Discord,
                message_type: MessageType::Text,
                content: "hello".into(),
                source_message_id: None,
            })
            .unwrap();

        for _ in 0..MAX_ATTEMPTS {
            let claimed = engine.claim_inbound_batch(10).unwrap();
            assert_eq!(claimed.len(), 1);
            engine.complete_inbound_failure(&id, "boom").unwrap();
        }

        let entry = engine.lock_state(|s| s.inbound_queue.get(&id).cloned()).unwrap();
        assert_eq!(entry.status, InboundQueueStatus::Expired);
        assert!(engine.claim_inbound_batch(10).unwrap().is_empty());
    }

    #[test]
    fn stuck_processing_rows_are_reclaimed_after_lock_timeout() {
        let engine = test_engine();
        let session_id = seed_session(&engine);
        engine
            .enqueue_inbound(EnqueueInbound {
                session_id,
                origin: AdapterKey::Discord,
                message_type: MessageType::Text,
                content: "hello".into(),
                source_message_id: None,
            })
            .unwrap();

        assert_eq!(engine.claim_inbound_batch(10).unwrap().len(), 1);
        assert!(engine.claim_inbound_batch(10).unwrap().is_empty());

        engine.clock.advance(chrono::Duration::seconds(LOCK_TIMEOUT + 1));

        let reclaimed = engine.claim_inbound_batch(10).unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].attempt_count, 2);
    }
}
