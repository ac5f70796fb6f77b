// SPDX-License-Identifier: Apache-2.0

//! Session registry and state store.

use crate::engine::Engine;
use crate::error::EngineError;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use teleclaude_adapters::SessionAdapter;
use teleclaude_core::event::Event;
use teleclaude_core::id::IdGen;
use teleclaude_core::session::{AdapterKey, HumanRole, Session, SessionId};
use teleclaude_core::Clock;

/// Fixed voice pool a new session's TTS voice is deterministically drawn
/// from. The pairing service itself is out of scope; this only stabilizes
/// which voice a session keeps across tmux restarts.
const VOICE_POOL: &[(&str, &str)] = &[
    ("elevenlabs", "rachel"),
    ("elevenlabs", "adam"),
    ("elevenlabs", "bella"),
    ("elevenlabs", "antoni"),
];

fn pick_voice(session_id: &SessionId) -> (&'static str, &'static str) {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    session_id.as_str().hash(&mut hasher);
    VOICE_POOL[(hasher.finish() as usize) % VOICE_POOL.len()]
}

/// Inputs to `create_session`; mirrors `Session` minus the fields the
/// registry derives (`id`, timestamps, `char_offset`).
#[derive(Debug, Clone)]
pub struct CreateSessionSpec {
    pub computer_name: String,
    pub project_path: PathBuf,
    pub tmux_session_name: Option<String>,
    pub initiator_session_id: Option<SessionId>,
    pub human_email: Option<String>,
    pub human_role: Option<HumanRole>,
}

/// Patch applied atomically to a session: `last_activity` and
/// `last_input_origin` are always updated together.
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub last_input_origin: Option<AdapterKey>,
    pub touch_activity: bool,
}

/// Filter for `list_sessions`.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub computer_name: Option<String>,
    pub active_only: bool,
}

impl<S, G, C> Engine<S, G, C>
where
    S: SessionAdapter,
    G: IdGen,
    C: Clock,
{
    /// Create a new session. Fails with `ContractViolation` (`AlreadyExists`)
    /// if another active session already uses the same
    /// `(computer_name, tmux_session_name)` pair.
    pub fn create_session(&self, spec: CreateSessionSpec) -> Result<Session, EngineError> {
        if let Some(ref tmux_name) = spec.tmux_session_name {
            let clash = self.lock_state(|state| {
                state.sessions.values().any(|s| {
                    s.is_active()
                        && s.computer_name == spec.computer_name
                        && s.tmux_session_name.as_deref() == Some(tmux_name.as_str())
                })
            });
            if clash {
                return Err(EngineError::ContractViolation(format!(
                    "AlreadyExists: session already bound to {}/{}",
                    spec.computer_name, tmux_name
                )));
            }
        }

        let session_id = SessionId::new(self.id_gen.next());
        self.apply(Event::SessionCreated {
            session_id: session_id.clone(),
            computer_name: spec.computer_name.clone(),
        })?;

        let (service_name, voice) = pick_voice(&session_id);
        self.apply(Event::VoiceAssignmentSeeded {
            key: session_id.as_str().to_string(),
            service_name: service_name.to_string(),
            voice: voice.to_string(),
            created_at: self.clock.now(),
        })?;

        self.lock_state_mut(|state| {
            if let Some(session) = state.sessions.get_mut(&session_id) {
                session.project_path = spec.project_path.clone();
                session.tmux_session_name = spec.tmux_session_name.clone();
                session.initiator_session_id = spec.initiator_session_id.clone();
                session.human_email = spec.human_email.clone();
                session.human_role = spec.human_role;
            }
        });

        Ok(self.get_session(&session_id).expect("just created"))
    }

    pub fn get_session(&self, id: &SessionId) -> Option<Session> {
        self.lock_state(|state| state.sessions.get(id).cloned())
    }

    /// Implicit creation path: find or create a session for an unknown
    /// customer contacting via `origin`.
    pub fn find_customer_session(&self, origin: &AdapterKey, identifier: &str) -> Option<Session> {
        self.lock_state(|state| {
            state
                .sessions
                .values()
                .find(|s| {
                    s.is_active()
                        && s.adapters.get(origin).is_some_and(|meta| {
                            meta.whatsapp_phone.as_deref() == Some(identifier)
                                || meta.telegram_topic_id.map(|t| t.to_string()).as_deref() == Some(identifier)
                                || meta.discord_thread_id.as_deref() == Some(identifier)
                        })
                })
                .cloned()
        })
    }

    /// Atomically apply `patch`. `last_activity` and `last_input_origin` are
    /// written together.
    pub fn update_session(&self, id: &SessionId, patch: SessionPatch) -> Result<Session, EngineError> {
        if let Some(origin) = patch.last_input_origin.clone() {
            self.apply(Event::SessionInputAdmitted {
                session_id: id.clone(),
                origin,
                at_epoch_ms: self.clock.now().timestamp_millis(),
            })?;
        } else if patch.touch_activity {
            self.lock_state_mut(|state| {
                if let Some(s) = state.sessions.get_mut(id) {
                    s.last_activity = self.clock.now();
                }
            });
        }
        self.get_session(id).ok_or_else(|| EngineError::not_found(id))
    }

    pub fn close_session(&self, id: &SessionId, reason: impl Into<String>) -> Result<Session, EngineError> {
        self.apply(Event::SessionClosed {
            session_id: id.clone(),
            reason: reason.into(),
        })?;
        self.get_session(id).ok_or_else(|| EngineError::not_found(id))
    }

    pub fn list_sessions(&self, filter: SessionFilter) -> Vec<Session> {
        self.lock_state(|state| {
            state
                .sessions
                .values()
                .filter(|s| {
                    filter
                        .computer_name
                        .as_deref()
                        .map_or(true, |c| c == s.computer_name)
                        && (!filter.active_only || s.is_active())
                })
                .cloned()
                .collect()
        })
    }

    /// Idle sweep: close every active session whose `last_activity` is
    /// older than `idle_after` (72-hour default).
    pub fn sweep_idle_sessions(&self, idle_after: chrono::Duration) -> Result<Vec<SessionId>, EngineError> {
        let now = self.clock.now();
        let stale: Vec<SessionId> = self.lock_state(|state| {
            state
                .sessions
                .values()
                .filter(|s| s.is_active() && now - s.last_activity > idle_after)
                .map(|s| s.id.clone())
                .collect()
        });
        for id in &stale {
            self.close_session(id, "idle_sweep")?;
        }
        Ok(stale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_engine;

    #[test]
    fn create_session_then_close_round_trips_lifecycle() {
        let engine = test_engine();
        let session = engine
            .create_session(CreateSessionSpec {
                computer_name: "host-a".into(),
                project_path: PathBuf::from("/repo"),
                tmux_session_name: Some("tc-1".into()),
                initiator_session_id: None,
                human_email: None,
                human_role: None,
            })
            .unwrap();
        assert!(session.is_active());

        engine.close_session(&session.id, "done").unwrap();
        let closed = engine.get_session(&session.id).unwrap();
        assert!(!closed.is_active());
    }

    #[test]
    fn create_session_rejects_duplicate_tmux_binding() {
        let engine = test_engine();
        let spec = CreateSessionSpec {
            computer_name: "host-a".into(),
            project_path: PathBuf::from("/repo"),
            tmux_session_name: Some("tc-dup".into()),
            initiator_session_id: None,
            human_email: None,
            human_role: None,
        };
        engine.create_session(spec.clone()).unwrap();
        let err = engine.create_session(spec).unwrap_err();
        assert!(matches!(err, EngineError::ContractViolation(_)));
    }

    #[test]
    fn update_session_patch_is_atomic_for_origin_and_activity() {
        let engine = test_engine();
        let session = engine
            .create_session(CreateSessionSpec {
                computer_name: "host-a".into(),
                project_path: PathBuf::from("/repo"),
                tmux_session_name: None,
                initiator_session_id: None,
                human_email: None,
                human_role: None,
            })
            .unwrap();

        let updated = engine
            .update_session(
                &session.id,
                SessionPatch {
                    last_input_origin: Some(AdapterKey::Discord),
                    touch_activity: true,
                },
            )
            .unwrap();
        assert_eq!(updated.last_input_origin, Some(AdapterKey::Discord));
    }

    #[test]
    fn create_session_seeds_a_voice_assignment_keyed_by_session_id() {
        let engine = test_engine();
        let session = engine
            .create_session(CreateSessionSpec {
                computer_name: "host-a".into(),
                project_path: PathBuf::from("/repo"),
                tmux_session_name: None,
                initiator_session_id: None,
                human_email: None,
                human_role: None,
            })
            .unwrap();

        let assignment = engine.lock_state(|s| s.voice_assignments.get(session.id.as_str()).cloned());
        assert!(assignment.is_some());
    }

    #[test]
    fn char_offset_round_trips_and_resets_on_stop() {
        let engine = test_engine();
        let session = engine
            .create_session(CreateSessionSpec {
                computer_name: "host-a".into(),
                project_path: PathBuf::from("/repo"),
                tmux_session_name: None,
                initiator_session_id: None,
                human_email: None,
                human_role: None,
            })
            .unwrap();

        engine
            .apply(Event::CharOffsetAdvanced {
                session_id: session.id.clone(),
                delta: 42,
            })
            .unwrap();
        assert_eq!(engine.get_session(&session.id).unwrap().char_offset, 42);

        engine
            .apply(Event::AgentStopped {
                session_id: session.id.clone(),
                checkpoint: false,
                last_output_summary: None,
            })
            .unwrap();
        assert_eq!(engine.get_session(&session.id).unwrap().char_offset, 0);
    }
}
