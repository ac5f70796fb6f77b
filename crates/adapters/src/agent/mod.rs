// SPDX-License-Identifier: Apache-2.0

//! Transcript parsing: turns raw captured pane output into a structured
//! summary of what the CLI agent did. Kept as an explicit capability trait
//! rather than duck-typed through the session adapter.
//!
//! Each CLI agent (Claude, Gemini, Codex) renders its own tool-call and
//! thinking markup; a concrete parser is per-agent and lives outside this
//! crate's scope. This module defines the seam and a fake for engine tests.

#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeSummarizer, FakeTranscriptParser};

use async_trait::async_trait;
use teleclaude_core::session::ActiveAgent;

/// Structured summary extracted from a pane capture, used to build the
/// digest sent to chat adapters and the one-line activity summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptSummary {
    pub last_assistant_text: Option<String>,
    pub tool_calls: Vec<String>,
    /// True when the pane output matches the session's configured
    /// checkpoint pattern.
    pub checkpoint_reached: bool,
}

/// Parses an agent's raw pane output into a [`TranscriptSummary`].
/// Implementations are agent-specific; this crate only defines the seam.
pub trait TranscriptParser: Send + Sync + 'static {
    fn agent(&self) -> ActiveAgent;
    fn parse(&self, raw_output: &str) -> TranscriptSummary;
}

/// Produces `last_output_summary` from a turn's raw output via an external
/// LLM call. Best-effort: a failure here never blocks fan-out, so callers
/// treat `Err` as "no summary" rather than propagating it.
#[async_trait]
pub trait Summarizer: Send + Sync + 'static {
    async fn summarize(&self, raw_output: &str) -> Result<String, String>;
}
