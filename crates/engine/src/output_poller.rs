// SPDX-License-Identifier: Apache-2.0

//! Output poller and threaded-output pager: turns raw tmux pane content
//! into adapter deliveries, either by editing a single "live" message in
//! place (standard mode) or by appending a new message per delta and
//! advancing the session's pagination cursor (threaded mode). Delivery to
//! a specific adapter is a narrow primitive here; the policy of *which*
//! adapters a delta goes to belongs to the fanout router, which calls
//! into these two methods per observer.

use crate::engine::Engine;
use crate::error::EngineError;
use teleclaude_adapters::{ChatAdapter, SessionAdapter};
use teleclaude_core::checkpoint::is_checkpoint_response;
use teleclaude_core::event::Event;
use teleclaude_core::session::{AdapterKey, SessionId};
use teleclaude_core::{Clock, IdGen};

/// Lines of tmux pane scrollback captured per poll. Generous enough to
/// outrun a single turn's output without re-reading the whole pane history.
const POLL_CAPTURE_LINES: u32 = 500;

impl<S, G, C> Engine<S, G, C>
where
    S: SessionAdapter,
    G: IdGen,
    C: Clock,
{
    /// Capture the pane and return the slice of it past `char_offset`, or
    /// `None` when there's nothing new (no output yet, or output shorter
    /// than what's already been delivered — e.g. the pane cleared).
    pub async fn poll_output_delta(&self, session_id: &SessionId) -> Result<Option<String>, EngineError> {
        let session = self.get_session(session_id).ok_or_else(|| EngineError::not_found(session_id))?;
        let Some(tmux_session_name) = session.tmux_session_name.clone() else {
            return Ok(None);
        };

        let raw_output = self.sessions.capture_output(&tmux_session_name, POLL_CAPTURE_LINES).await?;
        let offset = session.char_offset as usize;
        if raw_output.chars().count() <= offset {
            return Ok(None);
        }

        let delta: String = raw_output.chars().skip(offset).collect();
        if is_checkpoint_response(&delta) {
            return Ok(None);
        }
        Ok(Some(delta))
    }

    /// Standard mode: one "live" message per `(session, adapter)`, sent
    /// once and edited in place on every subsequent delta.
    pub async fn deliver_output_standard(&self, session_id: &SessionId, adapter_key: &AdapterKey, delta: &str) -> Result<(), EngineError> {
        let session = self.get_session(session_id).ok_or_else(|| EngineError::not_found(session_id))?;
        let channel_id = session
            .adapter_metadata(adapter_key)
            .and_then(|meta| meta.thread_id.clone())
            .ok_or_else(|| EngineError::ContractViolation(format!("no channel bound for {adapter_key} on session {session_id}")))?;
        let existing_message_id = session.adapter_metadata(adapter_key).and_then(|meta| meta.output_message_id.clone());

        let adapter = self.chat_adapter(adapter_key)?.clone();
        let body = Self::render_for_adapter(adapter.as_ref(), delta);

        match existing_message_id {
            Some(message_id) => {
                adapter
                    .edit_message(&channel_id, &teleclaude_adapters::SentMessageId(message_id), &body)
                    .await?;
            }
            None => {
                let sent = adapter.send_message(&channel_id, &body).await?;
                self.apply(Event::OutputMessageBound {
                    session_id: session_id.clone(),
                    adapter: adapter_key.clone(),
                    message_id: sent.0,
                })?;
            }
        }

        self.apply(Event::CharOffsetAdvanced {
            session_id: session_id.clone(),
            delta: delta.chars().count() as u64,
        })
    }

    /// Threaded mode: append a new message per delta (no edit-in-place),
    /// advancing the cursor the same way standard mode does.
    pub async fn deliver_output_threaded(&self, session_id: &SessionId, adapter_key: &AdapterKey, delta: &str) -> Result<(), EngineError> {
        let session = self.get_session(session_id).ok_or_else(|| EngineError::not_found(session_id))?;
        let channel_id = session
            .adapter_metadata(adapter_key)
            .and_then(|meta| meta.thread_id.clone())
            .ok_or_else(|| EngineError::ContractViolation(format!("no channel bound for {adapter_key} on session {session_id}")))?;

        let adapter = self.chat_adapter(adapter_key)?.clone();
        let body = Self::render_for_adapter(adapter.as_ref(), delta);
        adapter.send_message(&channel_id, &body).await?;

        self.apply(Event::CharOffsetAdvanced {
            session_id: session_id.clone(),
            delta: delta.chars().count() as u64,
        })
    }

    /// Markdown conversion plus truncation to the platform's message-length
    /// ceiling. Truncates by character count to keep UTF-8 boundaries intact.
    fn render_for_adapter(adapter: &dyn ChatAdapter, delta: &str) -> String {
        let rendered = adapter.to_platform_markdown(delta);
        let max_len = adapter.max_message_length();
        if rendered.chars().count() <= max_len {
            rendered
        } else {
            rendered.chars().take(max_len).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session_registry::CreateSessionSpec;
    use crate::test_support::test_fixture;
    use std::path::PathBuf;
    use teleclaude_core::event::Event;

    #[tokio::test]
    async fn poll_returns_none_until_new_output_arrives() {
        let fixture = test_fixture();
        let engine = &fixture.engine;
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
        engine.sessions.add_session("tc-1", true);

        assert!(engine.poll_output_delta(&session.id).await.unwrap().is_none());

        engine.sessions.set_output("tc-1", vec!["hello world".to_string()]);
        let delta = engine.poll_output_delta(&session.id).await.unwrap();
        assert_eq!(delta.as_deref(), Some("hello world"));
    }

    #[tokio::test]
    async fn poll_skips_checkpoint_marked_output() {
        let fixture = test_fixture();
        let engine = &fixture.engine;
        let session = engine
            .create_session(CreateSessionSpec {
                computer_name: "host-a".into(),
                project_path: PathBuf::from("/repo"),
                tmux_session_name: Some("tc-2".into()),
                initiator_session_id: None,
                human_email: None,
                human_role: None,
            })
            .unwrap();
        engine.sessions.add_session("tc-2", true);
        engine.sessions.set_output("tc-2", vec!["<<checkpoint>>".to_string()]);

        assert!(engine.poll_output_delta(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn standard_mode_sends_once_then_edits_in_place() {
        let fixture = test_fixture();
        let engine = &fixture.engine;
        let session = engine
            .create_session(CreateSessionSpec {
                computer_name: "host-a".into(),
                project_path: PathBuf::from("/repo"),
                tmux_session_name: Some("tc-3".into()),
                initiator_session_id: None,
                human_email: None,
                human_role: None,
            })
            .unwrap();
        engine
            .apply(Event::ChannelBound {
                session_id: session.id.clone(),
                adapter: AdapterKey::Telegram,
                channel_id: "chan-1".into(),
            })
            .unwrap();

        engine.deliver_output_standard(&session.id, &AdapterKey::Telegram, "first delta").await.unwrap();
        engine.deliver_output_standard(&session.id, &AdapterKey::Telegram, "second delta").await.unwrap();

        let calls = fixture.telegram.calls();
        assert_eq!(calls.iter().filter(|c| format!("{c:?}").contains("Send")).count(), 1);
        assert_eq!(calls.iter().filter(|c| format!("{c:?}").contains("Edit")).count(), 1);

        let total_advanced = "first delta".chars().count() + "second delta".chars().count();
        assert_eq!(engine.get_session(&session.id).unwrap().char_offset as usize, total_advanced);
    }

    #[tokio::test]
    async fn threaded_mode_sends_a_new_message_every_delta() {
        let fixture = test_fixture();
        let engine = &fixture.engine;
        let session = engine
            .create_session(CreateSessionSpec {
                computer_name: "host-a".into(),
                project_path: PathBuf::from("/repo"),
                tmux_session_name: Some("tc-4".into()),
                initiator_session_id: None,
                human_email: None,
                human_role: None,
            })
            .unwrap();
        engine
            .apply(Event::ChannelBound {
                session_id: session.id.clone(),
                adapter: AdapterKey::Discord,
                channel_id: "thread-1".into(),
            })
            .unwrap();

        engine.deliver_output_threaded(&session.id, &AdapterKey::Discord, "chunk one").await.unwrap();
        engine.deliver_output_threaded(&session.id, &AdapterKey::Discord, "chunk two").await.unwrap();

        let calls = fixture.discord.calls();
        assert_eq!(calls.iter().filter(|c| format!("{c:?}").contains("Send")).count(), 2);
    }

    #[tokio::test]
    async fn standard_mode_errors_when_no_channel_bound() {
        let fixture = test_fixture();
        let engine = &fixture.engine;
        let session = engine
            .create_session(CreateSessionSpec {
                computer_name: "host-a".into(),
                project_path: PathBuf::from("/repo"),
                tmux_session_name: Some("tc-5".into()),
                initiator_session_id: None,
                human_email: None,
                human_role: None,
            })
            .unwrap();

        let err = engine.deliver_output_standard(&session.id, &AdapterKey::Telegram, "text").await.unwrap_err();
        assert!(matches!(err, EngineError::ContractViolation(_)));
    }
}
