// SPDX-License-Identifier: Apache-2.0

//! Error types for the engine.

use teleclaude_adapters::{ChatError, SessionError};
use teleclaude_core::ErrorKind;
use teleclaude_storage::WalError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("contract violation: {0}")]
    ContractViolation(String),
    #[error("transient transport failure: {0}")]
    TransientTransport(String),
    #[error("platform constraint: {0}")]
    PlatformConstraint(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("peer delivery failed: {0}")]
    PeerDeliveryFailure(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("storage error: {0}")]
    Storage(#[from] WalError),
    #[error("session adapter error: {0}")]
    Session(#[from] SessionError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::ContractViolation(_) => ErrorKind::ContractViolation,
            EngineError::TransientTransport(_) => ErrorKind::TransientTransport,
            EngineError::PlatformConstraint(_) => ErrorKind::PlatformConstraint,
            EngineError::Timeout(_) => ErrorKind::Timeout,
            EngineError::PeerDeliveryFailure(_) => ErrorKind::PeerDeliveryFailure,
            EngineError::Internal(_) | EngineError::Storage(_) => ErrorKind::Internal,
            EngineError::Session(_) => ErrorKind::TransientTransport,
        }
    }

    pub fn not_found(what: impl std::fmt::Display) -> Self {
        EngineError::ContractViolation(format!("not found: {what}"))
    }
}

impl From<ChatError> for EngineError {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::ChannelNotFound(s) => EngineError::ContractViolation(s),
            ChatError::Transient(s) => EngineError::TransientTransport(s),
            ChatError::PlatformConstraint(s) => EngineError::PlatformConstraint(s),
        }
    }
}
