// SPDX-License-Identifier: Apache-2.0

//! Dispatches drained hook envelopes by `event_type` and drives the
//! per-session `idle <-> working` sub-state through a prompt/stop cycle.

use crate::engine::Engine;
use crate::error::EngineError;
use teleclaude_adapters::SessionAdapter;
use teleclaude_core::checkpoint::is_checkpoint_response;
use teleclaude_core::event::Event;
use teleclaude_core::hook::{HookEnvelope, HookEventType};
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
    pub async fn handle_agent_event(&self, envelope: &HookEnvelope) -> Result<(), EngineError> {
        match envelope.event_type {
            HookEventType::SessionStart => self.handle_session_start(envelope),
            HookEventType::Prompt => self.handle_prompt(envelope),
            HookEventType::Stop => self.handle_stop(&envelope.session_id).await,
            HookEventType::Notification => self.handle_notification(envelope),
            HookEventType::SessionEnd => Ok(()),
        }
    }

    fn handle_session_start(&self, envelope: &HookEnvelope) -> Result<(), EngineError> {
        let native_session_id = envelope
            .data
            .get("native_session_id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let transcript_path = envelope
            .data
            .get("transcript_path")
            .and_then(|v| v.as_str())
            .map(std::path::PathBuf::from);

        self.apply(Event::AgentStarted {
            session_id: envelope.session_id.clone(),
            native_session_id: native_session_id.clone(),
            transcript_path,
        })?;

        if !native_session_id.is_empty() {
            self.apply(Event::VoiceAssignmentUpgraded {
                old_key: envelope.session_id.as_str().to_string(),
                new_key: native_session_id,
            })?;
        }

        Ok(())
    }

    fn handle_prompt(&self, envelope: &HookEnvelope) -> Result<(), EngineError> {
        let content = envelope.data.get("content").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        self.apply(Event::PromptRecorded {
            session_id: envelope.session_id.clone(),
            content,
            at: self.clock.now(),
        })
    }

    fn handle_notification(&self, envelope: &HookEnvelope) -> Result<(), EngineError> {
        let Some(session) = self.get_session(&envelope.session_id) else {
            return Ok(());
        };
        let Some(origin) = session.last_input_origin.clone() else {
            return Ok(());
        };
        let Ok(adapter) = self.chat_adapter(&origin) else {
            return Ok(());
        };
        let Some(meta) = session.adapter_metadata(&origin) else {
            return Ok(());
        };
        let Some(channel_id) = meta.thread_id.clone() else {
            return Ok(());
        };
        let body = envelope.data.get("message").and_then(|v| v.as_str()).unwrap_or("notification").to_string();
        let adapter = adapter.clone();
        tokio::spawn(async move {
            if let Err(e) = adapter.send_message(&channel_id, &body).await {
                warn!(error = %e, "admin channel notification delivery failed");
            }
        });
        Ok(())
    }

    /// Runs the full "stop" sequence: capture output, check the
    /// checkpoint filter, fan out to linked peers and listeners, then
    /// record the turn. Every path ends in `finish_stop`, so
    /// `char_offset` resets on every stop regardless of which branch
    /// got there; a checkpoint-filtered turn skips only the peer
    /// fan-out and listener notification, not the offset reset.
    async fn handle_stop(&self, session_id: &SessionId) -> Result<(), EngineError> {
        let Some(session) = self.get_session(session_id) else {
            return Ok(());
        };
        let Some(tmux_session_name) = session.tmux_session_name.clone() else {
            return self.finish_stop(session_id, false, None).await;
        };

        let raw_output = match self.sessions.capture_output(&tmux_session_name, 500).await {
            Ok(output) => output,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "transcript capture failed on stop");
                return self.finish_stop(session_id, false, None).await;
            }
        };

        let summary = session
            .active_agent
            .and_then(|agent| self.transcript_parser(agent))
            .map(|parser| parser.parse(&raw_output))
            .unwrap_or_default();

        if summary.checkpoint_reached || is_checkpoint_response(&raw_output) {
            return self.finish_stop(session_id, true, None).await;
        }

        let last_output_summary = match &self.summarizer {
            Some(summarizer) => match summarizer.summarize(&raw_output).await {
                Ok(summary) => Some(summary),
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "summarization failed, continuing without it");
                    None
                }
            },
            None => summary.last_assistant_text.clone(),
        };

        self.fan_out_linked_stop(session_id, &session.computer_name, last_output_summary.as_deref().unwrap_or(&raw_output))
            .await;
        let notified = self.notify_listeners_on_stop(session_id).await?;
        if notified > 0 {
            tracing::debug!(session_id = %session_id, notified, "stop listeners notified");
        }

        self.finish_stop(session_id, false, last_output_summary).await
    }

    async fn finish_stop(&self, session_id: &SessionId, checkpoint: bool, last_output_summary: Option<String>) -> Result<(), EngineError> {
        self.apply(Event::AgentStopped {
            session_id: session_id.clone(),
            checkpoint,
            last_output_summary,
        })
    }

    /// Linked-stop fan-out: deliver a framed message to every other member
    /// of the session's active direct link, isolating per-peer failures so
    /// one unreachable peer never blocks the rest.
    async fn fan_out_linked_stop(&self, session_id: &SessionId, title: &str, distilled_output: &str) {
        let links = self.active_links_for_session(session_id);
        for link_id in links {
            let peers = self.list_peer_members(&link_id, session_id);
            for peer in peers {
                let Some(peer_session) = self.get_session(&peer.session_id) else {
                    continue;
                };
                let Some(ref peer_tmux) = peer_session.tmux_session_name else {
                    continue;
                };
                let message = format!("[From {title}] {distilled_output}");
                if let Err(e) = self.sessions.send(peer_tmux, &message).await {
                    warn!(
                        session_id = %session_id,
                        peer_session_id = %peer.session_id,
                        error = %e,
                        "linked-stop peer delivery failed"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session_registry::CreateSessionSpec;
    use crate::test_support::test_engine;
    use std::path::PathBuf;
    use teleclaude_core::checkpoint::CHECKPOINT_MARKER;
    use teleclaude_core::hook::HookEnvelope;

    fn seed_session(engine: &crate::test_support::TestEngine, tmux_session_name: Option<&str>) -> SessionId {
        let session = engine
            .create_session(CreateSessionSpec {
                computer_name: "host-a".into(),
                project_path: PathBuf::from("/repo"),
                tmux_session_name: tmux_session_name.map(|s| s.to_string()),
                initiator_session_id: None,
                human_email: None,
                human_role: None,
            })
            .unwrap();
        session.id
    }

    #[tokio::test]
    async fn session_start_records_native_id_and_upgrades_voice_key() {
        let engine = test_engine();
        let session_id = seed_session(&engine, None);

        let envelope = HookEnvelope {
            session_id: session_id.clone(),
            event_type: HookEventType::SessionStart,
            data: serde_json::json!({"native_session_id": "native-1", "transcript_path": "/tmp/t.jsonl"}),
        };
        engine.handle_agent_event(&envelope).await.unwrap();

        let session = engine.get_session(&session_id).unwrap();
        assert_eq!(session.native_session_id.as_deref(), Some("native-1"));
        assert_eq!(session.transcript_path, Some(PathBuf::from("/tmp/t.jsonl")));

        let upgraded = engine.lock_state(|s| s.voice_assignments.get("native-1").cloned());
        assert!(upgraded.is_some());
    }

    #[tokio::test]
    async fn prompt_event_updates_last_message_sent() {
        let engine = test_engine();
        let session_id = seed_session(&engine, None);

        let envelope = HookEnvelope {
            session_id: session_id.clone(),
            event_type: HookEventType::Prompt,
            data: serde_json::json!({"content": "fix the bug"}),
        };
        engine.handle_agent_event(&envelope).await.unwrap();

        let session = engine.get_session(&session_id).unwrap();
        assert_eq!(session.last_message_sent.as_deref(), Some("fix the bug"));
        assert!(session.last_message_sent_at.is_some());
    }

    #[tokio::test]
    async fn checkpoint_output_skips_fanout_but_resets_char_offset() {
        let engine = test_engine();
        let a = seed_session(&engine, Some("tc-1"));
        let b = seed_session(&engine, Some("tc-1b"));
        engine.sessions.add_session("tc-1", true);
        engine.sessions.add_session("tc-1b", true);
        engine.sessions.set_output("tc-1", vec![format!("turn done {CHECKPOINT_MARKER}")]);
        engine.create_or_reuse_direct_link(&a, &b).unwrap();

        engine
            .apply(Event::CharOffsetAdvanced {
                session_id: a.clone(),
                delta: 10,
            })
            .unwrap();

        engine.handle_stop(&a).await.unwrap();

        // a checkpoint turn skips peer fan-out and listener notification...
        let calls = engine.sessions.calls();
        assert!(!calls.iter().any(|c| format!("{c:?}").contains("tc-1b")));
        // ...but still resets char_offset like every other stop.
        assert_eq!(engine.get_session(&a).unwrap().char_offset, 0);
    }

    #[tokio::test]
    async fn non_checkpoint_stop_resets_char_offset() {
        let engine = test_engine();
        let session_id = seed_session(&engine, Some("tc-2"));
        engine.sessions.add_session("tc-2", true);
        engine.sessions.set_output("tc-2", vec!["normal turn output".to_string()]);

        engine
            .apply(Event::CharOffsetAdvanced {
                session_id: session_id.clone(),
                delta: 7,
            })
            .unwrap();

        engine.handle_stop(&session_id).await.unwrap();
        assert_eq!(engine.get_session(&session_id).unwrap().char_offset, 0);
    }

    #[tokio::test]
    async fn linked_stop_delivers_framed_message_to_peer() {
        let engine = test_engine();
        let a = seed_session(&engine, Some("tc-a"));
        let b = seed_session(&engine, Some("tc-b"));
        engine.sessions.add_session("tc-a", true);
        engine.sessions.add_session("tc-b", true);
        engine.sessions.set_output("tc-a", vec!["normal turn output".to_string()]);
        engine.create_or_reuse_direct_link(&a, &b).unwrap();

        engine.handle_stop(&a).await.unwrap();

        let calls = engine.sessions.calls();
        assert!(calls.iter().any(|c| format!("{c:?}").contains("tc-b")));
    }
}
