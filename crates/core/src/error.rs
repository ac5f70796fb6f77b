// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy shared across crates.
//!
//! This is the *kind* vocabulary, not a single error type — each crate still
//! defines its own `thiserror` enum for its own failure modes, but every
//! leaf error can be classified into one of these kinds so the propagation
//! policy can be applied mechanically by worker loops.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which classification bucket an error falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Invalid request, unknown session id, missing required field: surfaced
    /// immediately, never retried.
    ContractViolation,
    /// HTTP 429/5xx, Redis disconnect, socket reset: retried with backoff.
    TransientTransport,
    /// WhatsApp 24h-window violation, Telegram MarkdownV2 parse error, Discord
    /// rate limit: platform-specific fallback or warn+fail.
    PlatformConstraint,
    /// Any suspension point exceeding its timeout: cancel + retry with backoff.
    Timeout,
    /// Linked-stop fan-out to one peer failed: isolated, never aborts the rest.
    PeerDeliveryFailure,
    /// Unexpected: logged with session id + adapter key, entry fails → expires.
    Internal,
}

impl ErrorKind {
    /// Only ContractViolation propagates to the caller.
    pub fn propagates_to_caller(&self) -> bool {
        matches!(self, ErrorKind::ContractViolation)
    }

    /// Everything else is eligible for outbox retry.
    pub fn is_retryable(&self) -> bool {
        !self.propagates_to_caller()
    }
}

#[derive(Debug, Error)]
#[error("{kind:?}: {message}")]
pub struct TeleClaudeError {
    pub kind: ErrorKind,
    pub message: String,
}

impl TeleClaudeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn contract_violation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ContractViolation, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}
