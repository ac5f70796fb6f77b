// SPDX-License-Identifier: Apache-2.0

//! Session-listener bus: one-shot orchestrator/worker "stop" subscriptions,
//! persisted across restart via the same WAL every other registry uses.

use crate::engine::Engine;
use crate::error::EngineError;
use teleclaude_adapters::SessionAdapter;
use teleclaude_core::event::Event;
use teleclaude_core::id::IdGen;
use teleclaude_core::session::SessionId;
use teleclaude_core::Clock;
use tracing::warn;

impl<S, G, C> Engine<S, G, C>
where
    S: SessionAdapter,
    G: IdGen,
    C: Clock,
{
    /// Per-target-caller unique; re-registering the same pair is a no-op.
    pub fn notify_on_stop(&self, target_session_id: &SessionId, caller_session_id: &SessionId, caller_tmux: &str) -> Result<(), EngineError> {
        self.apply(Event::ListenerRegistered {
            target_session_id: target_session_id.clone(),
            caller_session_id: caller_session_id.clone(),
        })?;
        self.lock_state_mut(|state| {
            if let Some(record) = state
                .session_listeners
                .get_mut(&(target_session_id.clone(), caller_session_id.clone()))
            {
                record.caller_tmux_session = caller_tmux.to_string();
            }
        });
        Ok(())
    }

    /// Deliver one notification into each registered caller's tmux input,
    /// then fire (remove) the registration. A single caller's delivery
    /// failure never aborts the rest.
    pub async fn notify_listeners_on_stop(&self, target_session_id: &SessionId) -> Result<usize, EngineError> {
        let listeners = self.lock_state(|state| {
            state
                .listeners_for_target(target_session_id)
                .into_iter()
                .cloned()
                .collect::<Vec<_>>()
        });

        let mut notified = 0;
        for listener in listeners {
            let message = format!("[listener] session {target_session_id} stopped");
            match self.sessions.send(&listener.caller_tmux_session, &message).await {
                Ok(()) => {
                    notified += 1;
                }
                Err(e) => {
                    warn!(
                        target_session_id = %target_session_id,
                        caller_session_id = %listener.caller_session_id,
                        error = %e,
                        "listener notification delivery failed"
                    );
                }
            }
            self.apply(Event::ListenerFired {
                target_session_id: target_session_id.clone(),
                caller_session_id: listener.caller_session_id.clone(),
            })?;
        }
        Ok(notified)
    }

    /// Swept on either the caller's or the target's session end.
    pub fn sweep_listeners_for_session(&self, session_id: &SessionId) -> Result<(), EngineError> {
        self.apply(Event::ListenerSwept {
            session_id: session_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_engine;

    #[tokio::test]
    async fn notify_fires_exactly_once_per_caller() {
        let engine = test_engine();
        let target = SessionId::new("target");
        let caller = SessionId::new("caller");

        engine.notify_on_stop(&target, &caller, "tmux-caller").unwrap();
        engine.sessions.add_session("tmux-caller", true);

        let notified = engine.notify_listeners_on_stop(&target).await.unwrap();
        assert_eq!(notified, 1);
        assert!(engine.lock_state(|s| s.listeners_for_target(&target).is_empty()));

        let notified_again = engine.notify_listeners_on_stop(&target).await.unwrap();
        assert_eq!(notified_again, 0);
    }

    #[test]
    fn re_registering_same_pair_is_a_no_op() {
        let engine = test_engine();
        let target = SessionId::new("target");
        let caller = SessionId::new("caller");

        engine.notify_on_stop(&target, &caller, "tmux-caller").unwrap();
        engine.notify_on_stop(&target, &caller, "tmux-caller").unwrap();
        assert_eq!(engine.lock_state(|s| s.listeners_for_target(&target).len()), 1);
    }

    #[test]
    fn sweep_removes_listener_by_either_target_or_caller() {
        let engine = test_engine();
        let target = SessionId::new("target");
        let caller = SessionId::new("caller");
        engine.notify_on_stop(&target, &caller, "tmux-caller").unwrap();

        engine.sweep_listeners_for_session(&caller).unwrap();
        assert!(engine.lock_state(|s| s.listeners_for_target(&target).is_empty()));
    }
}
