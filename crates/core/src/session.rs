// SPDX-License-Identifier: Apache-2.0

//! Session: the unit of coordination.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

crate::define_id! {
    /// Opaque identifier for a coordinated conversation.
    ///
    /// Never reused: a revived session mints a fresh id.
    pub struct SessionId;
}

/// CLI agent driving a session's tmux pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveAgent {
    Claude,
    Gemini,
    Codex,
}

/// Agent "thinking" effort dial, mirrored into the agent CLI's own flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ThinkingMode {
    Fast,
    #[default]
    Med,
    Slow,
}

/// Coarse role used for provenance and notification routing decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HumanRole {
    Admin,
    Member,
    Contributor,
    Newcomer,
    Customer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    #[default]
    Active,
    Closed,
}

/// Key identifying one of the adapter transports a session can be observed through.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKey {
    Telegram,
    Discord,
    WhatsApp,
    Web,
    Tui,
    Mcp,
}

impl AdapterKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterKey::Telegram => "telegram",
            AdapterKey::Discord => "discord",
            AdapterKey::WhatsApp => "whatsapp",
            AdapterKey::Web => "web",
            AdapterKey::Tui => "tui",
            AdapterKey::Mcp => "mcp",
        }
    }
}

impl std::fmt::Display for AdapterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-session per-adapter sub-record.
///
/// Owned by the `Session`; lifecycle bound to it — never addressed
/// independently of the session it belongs to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdapterMetadata {
    /// Telegram forum-topic id, when this session has a dedicated topic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram_topic_id: Option<i64>,
    /// Discord thread id, when this session has a dedicated thread.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord_thread_id: Option<String>,
    /// WhatsApp phone number in E.164 form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whatsapp_phone: Option<String>,
    /// Last time this adapter delivered a customer message (24h-window tracking).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_customer_message_at: Option<DateTime<Utc>>,
    /// Message id of the "live" output message, for standard-mode edit-in-place.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_message_id: Option<String>,
    /// Whether the "session started" badge has already been sent on this adapter.
    #[serde(default)]
    pub badge_sent: bool,
    /// Thread id used by Discord and by threaded-output mode on any adapter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Whether this adapter is enabled as an observer for the session.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// The unit of coordination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub computer_name: String,
    /// Absent for headless sessions doing TTS/summarization only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmux_session_name: Option<String>,
    /// Which adapter most recently contributed input for this session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_input_origin: Option<AdapterKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_agent: Option<ActiveAgent>,
    #[serde(default)]
    pub thinking_mode: ThinkingMode,
    #[serde(default)]
    pub lifecycle_status: LifecycleStatus,
    pub project_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdir: Option<PathBuf>,
    /// Set when this session was spawned by another agent session (AI-to-AI nesting).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiator_session_id: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_role: Option<HumanRole>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    /// Session-level, adapter-agnostic pagination cursor into the transcript/pane.
    /// Reset to 0 on every `stop` event.
    #[serde(default)]
    pub char_offset: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_output_digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_output_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_sent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_sent_at: Option<DateTime<Utc>>,
    /// The id the CLI agent assigns to itself (distinct from `id`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_path: Option<PathBuf>,
    #[serde(default)]
    pub adapters: HashMap<AdapterKey, AdapterMetadata>,
}

impl Session {
    /// Build a new active session. `char_offset` starts at 0, `last_activity`
    /// equals `created_at` until the first input is admitted.
    pub fn new(id: SessionId, computer_name: impl Into<String>, project_path: PathBuf, now: DateTime<Utc>) -> Self {
        Self {
            id,
            computer_name: computer_name.into(),
            tmux_session_name: None,
            last_input_origin: None,
            active_agent: None,
            thinking_mode: ThinkingMode::default(),
            lifecycle_status: LifecycleStatus::Active,
            project_path,
            subdir: None,
            initiator_session_id: None,
            human_email: None,
            human_role: None,
            created_at: now,
            last_activity: now,
            closed_at: None,
            char_offset: 0,
            last_output_digest: None,
            last_output_summary: None,
            last_message_sent: None,
            last_message_sent_at: None,
            native_session_id: None,
            transcript_path: None,
            adapters: HashMap::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle_status == LifecycleStatus::Active
    }

    pub fn is_headless(&self) -> bool {
        self.tmux_session_name.is_none()
    }

    pub fn adapter_metadata(&self, key: &AdapterKey) -> Option<&AdapterMetadata> {
        self.adapters.get(key)
    }

    pub fn adapter_metadata_mut(&mut self, key: AdapterKey) -> &mut AdapterMetadata {
        self.adapters.entry(key).or_default()
    }

    /// Enabled adapters other than `origin` — the observer set for fanout.
    pub fn observer_adapters(&self, origin: &AdapterKey) -> Vec<AdapterKey> {
        self.adapters
            .iter()
            .filter(|(key, meta)| *key != origin && meta.enabled)
            .map(|(key, _)| key.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(
            SessionId::new("s1"),
            "host-a",
            PathBuf::from("/repo"),
            DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
        )
    }

    #[test]
    fn new_session_is_active_with_zero_offset() {
        let s = session();
        assert!(s.is_active());
        assert_eq!(s.char_offset, 0);
        assert!(s.is_headless());
    }

    #[test]
    fn observer_adapters_excludes_origin_and_disabled() {
        let mut s = session();
        s.adapter_metadata_mut(AdapterKey::Telegram);
        s.adapter_metadata_mut(AdapterKey::Discord);
        s.adapter_metadata_mut(AdapterKey::WhatsApp).enabled = false;

        let mut observers = s.observer_adapters(&AdapterKey::Telegram);
        observers.sort();
        assert_eq!(observers, vec![AdapterKey::Discord]);
    }
}
