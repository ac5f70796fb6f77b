// SPDX-License-Identifier: Apache-2.0

//! SessionListener: one-shot orchestrator/worker "stop" subscription.

use crate::session::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionListenerRecord {
    pub target_session_id: SessionId,
    pub caller_session_id: SessionId,
    pub caller_tmux_session: String,
    pub registered_at: DateTime<Utc>,
}

impl SessionListenerRecord {
    /// Listeners are per-target-caller unique.
    pub fn key(&self) -> (SessionId, SessionId) {
        (self.target_session_id.clone(), self.caller_session_id.clone())
    }
}
