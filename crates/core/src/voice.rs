// SPDX-License-Identifier: Apache-2.0

//! VoiceAssignment: stable TTS voice per session across tmux restarts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 7-day TTL for a voice assignment.
pub const VOICE_ASSIGNMENT_TTL_SECS: i64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceAssignment {
    /// Keyed first by our `session_id`, later duplicated keyed by `native_session_id`
    /// once the agent's `session_start` hook delivers it.
    pub key: String,
    pub service_name: String,
    pub voice: String,
    pub created_at: DateTime<Utc>,
}

impl VoiceAssignment {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        (now - self.created_at).num_seconds() > VOICE_ASSIGNMENT_TTL_SECS
    }
}
