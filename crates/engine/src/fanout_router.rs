// SPDX-License-Identifier: Apache-2.0

//! Adapter fanout router: decides which chat adapters see an outbound
//! message and provisions the channels they need. The origin
//! adapter (the session's `last_input_origin`) gets the full delivery;
//! every other enabled adapter is a silent observer that gets a reflected
//! copy, never the sender's own echo.

use crate::engine::Engine;
use crate::error::EngineError;
use teleclaude_adapters::SessionAdapter;
use teleclaude_core::checkpoint::is_checkpoint_response;
use teleclaude_core::event::Event;
use teleclaude_core::id::IdGen;
use teleclaude_core::session::{ActiveAgent, AdapterKey, SessionId};
use teleclaude_core::Clock;
use tracing::warn;

impl<S, G, C> Engine<S, G, C>
where
    S: SessionAdapter,
    G: IdGen,
    C: Clock,
{
    /// Funnels every registered adapter's channel provisioning through one
    /// call, recording the result via `Event::ChannelBound` so later
    /// deliveries (origin send, reflection, output polling) can look the
    /// channel id up without re-provisioning it.
    pub async fn ensure_ui_channels(&self, session_id: &SessionId, session_label: &str) -> Result<(), EngineError> {
        let keys: Vec<AdapterKey> = self.chat_adapters.keys().cloned().collect();
        for key in keys {
            let adapter = self.chat_adapter(&key)?.clone();
            match adapter.ensure_channel(session_label).await {
                Ok(channel_id) => {
                    self.apply(Event::ChannelBound {
                        session_id: session_id.clone(),
                        adapter: key,
                        channel_id,
                    })?;
                }
                Err(e) => {
                    warn!(adapter = %key, session_id = %session_id, error = %e, "[UI_LANE] channel provisioning failed");
                }
            }
        }
        Ok(())
    }

    /// Deliver `body` to the session's origin adapter, then reflect it to
    /// every other enabled observer adapter. Checkpoint-marked content is
    /// dropped silently on both lanes. Reflection lanes run concurrently
    /// and are isolated from each other; one adapter's failure is logged
    /// under `[UI_LANE]` and never blocks the rest.
    pub async fn fan_out_message(&self, session_id: &SessionId, body: &str) -> Result<(), EngineError> {
        if is_checkpoint_response(body) {
            return Ok(());
        }
        let session = self.get_session(session_id).ok_or_else(|| EngineError::not_found(session_id))?;
        let Some(origin) = session.last_input_origin.clone() else {
            return Ok(());
        };

        if let (Ok(adapter), Some(channel_id)) = (self.chat_adapter(&origin), session.adapter_metadata(&origin).and_then(|m| m.thread_id.clone())) {
            let _ = adapter.typing_indicator(&channel_id).await;
            if let Err(e) = adapter.send_message(&channel_id, body).await {
                warn!(adapter = %origin, session_id = %session_id, error = %e, "[UI_LANE] origin delivery failed");
            }
        }

        let mut lanes = tokio::task::JoinSet::new();
        for observer in session.observer_adapters(&origin) {
            let Some(channel_id) = session.adapter_metadata(&observer).and_then(|m| m.thread_id.clone()) else {
                continue;
            };
            let Ok(adapter) = self.chat_adapter(&observer) else {
                continue;
            };
            let adapter = adapter.clone();
            let body = body.to_string();
            let session_id = session_id.clone();
            lanes.spawn(async move {
                if let Err(e) = adapter.send_message(&channel_id, &body).await {
                    warn!(adapter = %observer, session_id = %session_id, error = %e, "[UI_LANE] reflected delivery failed");
                }
            });
        }
        while lanes.join_next().await.is_some() {}

        Ok(())
    }

    /// Threaded-output gate: Discord origin always qualifies; otherwise
    /// the session's active agent must be in the experiment's
    /// agent list. The list is caller-supplied, never hardcoded here.
    pub fn threaded_output_enabled(&self, session_id: &SessionId, experiment_agents: &[ActiveAgent]) -> bool {
        let Some(session) = self.get_session(session_id) else {
            return false;
        };
        session.last_input_origin == Some(AdapterKey::Discord)
            || session.active_agent.is_some_and(|agent| experiment_agents.contains(&agent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session_registry::CreateSessionSpec;
    use crate::session_registry::SessionPatch;
    use crate::test_support::test_fixture;
    use std::path::PathBuf;

    async fn seeded(fixture: &crate::test_support::TestFixture) -> SessionId {
        let session = fixture
            .engine
            .create_session(CreateSessionSpec {
                computer_name: "host-a".into(),
                project_path: PathBuf::from("/repo"),
                tmux_session_name: None,
                initiator_session_id: None,
                human_email: None,
                human_role: None,
            })
            .unwrap();
        fixture
            .engine
            .update_session(
                &session.id,
                SessionPatch {
                    last_input_origin: Some(AdapterKey::Telegram),
                    touch_activity: true,
                },
            )
            .unwrap();
        session.id
    }

    #[tokio::test]
    async fn ensure_ui_channels_binds_every_registered_adapter() {
        let fixture = test_fixture();
        let session_id = seeded(&fixture).await;

        fixture.engine.ensure_ui_channels(&session_id, "s-label").await.unwrap();

        let session = fixture.engine.get_session(&session_id).unwrap();
        assert!(session.adapter_metadata(&AdapterKey::Telegram).unwrap().thread_id.is_some());
        assert!(session.adapter_metadata(&AdapterKey::Discord).unwrap().thread_id.is_some());
    }

    #[tokio::test]
    async fn fan_out_delivers_to_origin_and_reflects_to_observers_only() {
        let fixture = test_fixture();
        let session_id = seeded(&fixture).await;
        fixture.engine.ensure_ui_channels(&session_id, "s-label").await.unwrap();

        fixture.engine.fan_out_message(&session_id, "hello there").await.unwrap();

        let telegram_calls = fixture.telegram.calls();
        let discord_calls = fixture.discord.calls();
        assert!(telegram_calls
            .iter()
            .any(|c| matches!(c, teleclaude_adapters::ChatCall::SendMessage { body, .. } if body == "hello there")));
        assert!(discord_calls
            .iter()
            .any(|c| matches!(c, teleclaude_adapters::ChatCall::SendMessage { body, .. } if body == "hello there")));
    }

    #[tokio::test]
    async fn fan_out_drops_checkpoint_marked_content() {
        let fixture = test_fixture();
        let session_id = seeded(&fixture).await;
        fixture.engine.ensure_ui_channels(&session_id, "s-label").await.unwrap();

        fixture.engine.fan_out_message(&session_id, "done <<checkpoint>>").await.unwrap();

        assert!(fixture.telegram.calls().iter().all(|c| !matches!(c, teleclaude_adapters::ChatCall::SendMessage { .. })));
    }

    #[tokio::test]
    async fn threaded_output_enabled_for_discord_origin() {
        let fixture = test_fixture();
        let session_id = seeded(&fixture).await;
        fixture
            .engine
            .update_session(
                &session_id,
                SessionPatch {
                    last_input_origin: Some(AdapterKey::Discord),
                    touch_activity: true,
                },
            )
            .unwrap();

        assert!(fixture.engine.threaded_output_enabled(&session_id, &[]));
    }

    #[tokio::test]
    async fn threaded_output_disabled_without_matching_agent_or_discord() {
        let fixture = test_fixture();
        let session_id = seeded(&fixture).await;
        assert!(!fixture.engine.threaded_output_enabled(&session_id, &[ActiveAgent::Gemini]));
    }
}
