// SPDX-License-Identifier: Apache-2.0

//! ConversationLink: multi-member fan-out container.

use crate::session::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

crate::define_id! {
    pub struct LinkId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkMode {
    /// Two-member peer channel for AI-to-AI turn exchange.
    DirectLink,
    /// Multi-member link (more than two participants).
    GatheringLink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Active,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkMember {
    pub link_id: LinkId,
    pub session_id: SessionId,
    pub participant_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_role: Option<String>,
    pub computer_name: String,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationLink {
    pub link_id: LinkId,
    pub mode: LinkMode,
    pub status: LinkStatus,
    pub created_by_session_id: SessionId,
    #[serde(default)]
    pub metadata_json: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl ConversationLink {
    pub fn is_active(&self) -> bool {
        self.status == LinkStatus::Active
    }
}
