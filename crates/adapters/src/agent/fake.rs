// SPDX-License-Identifier: Apache-2.0

use super::{Summarizer, TranscriptParser, TranscriptSummary};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use teleclaude_core::session::ActiveAgent;

/// Fake transcript parser: returns whatever summary was queued, in order.
pub struct FakeTranscriptParser {
    agent: ActiveAgent,
    queued: Arc<Mutex<Vec<TranscriptSummary>>>,
}

impl FakeTranscriptParser {
    pub fn new(agent: ActiveAgent) -> Self {
        Self {
            agent,
            queued: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn push_summary(&self, summary: TranscriptSummary) {
        self.queued.lock().push(summary);
    }
}

impl TranscriptParser for FakeTranscriptParser {
    fn agent(&self) -> ActiveAgent {
        self.agent
    }

    fn parse(&self, raw_output: &str) -> TranscriptSummary {
        let mut queued = self.queued.lock();
        if !queued.is_empty() {
            return queued.remove(0);
        }
        TranscriptSummary {
            last_assistant_text: Some(raw_output.to_string()),
            tool_calls: Vec::new(),
            checkpoint_reached: false,
        }
    }
}

/// Fake summarizer: echoes a truncated prefix of the input, or fails once
/// per queued failure, in order.
pub struct FakeSummarizer {
    fail_next: Arc<Mutex<Vec<String>>>,
}

impl Default for FakeSummarizer {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeSummarizer {
    pub fn new() -> Self {
        Self {
            fail_next: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn fail_next(&self, error: impl Into<String>) {
        self.fail_next.lock().push(error.into());
    }
}

#[async_trait]
impl Summarizer for FakeSummarizer {
    async fn summarize(&self, raw_output: &str) -> Result<String, String> {
        if let Some(error) = self.fail_next.lock().pop() {
            return Err(error);
        }
        Ok(raw_output.chars().take(200).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queued_summary_takes_precedence() {
        let parser = FakeTranscriptParser::new(ActiveAgent::Claude);
        parser.push_summary(TranscriptSummary {
            last_assistant_text: Some("done".to_string()),
            tool_calls: vec!["bash".to_string()],
            checkpoint_reached: true,
        });

        let summary = parser.parse("raw pane text");
        assert!(summary.checkpoint_reached);
        assert_eq!(summary.tool_calls, vec!["bash".to_string()]);
    }

    #[test]
    fn falls_back_to_raw_text_when_queue_is_empty() {
        let parser = FakeTranscriptParser::new(ActiveAgent::Gemini);
        let summary = parser.parse("hello");
        assert_eq!(summary.last_assistant_text.as_deref(), Some("hello"));
        assert!(!summary.checkpoint_reached);
    }

    #[tokio::test]
    async fn summarizer_echoes_by_default_and_fails_once_when_queued() {
        let summarizer = FakeSummarizer::new();
        assert_eq!(summarizer.summarize("hello").await.unwrap(), "hello");

        summarizer.fail_next("rate limited");
        let err = summarizer.summarize("hello").await.unwrap_err();
        assert_eq!(err, "rate limited");
        assert_eq!(summarizer.summarize("hello").await.unwrap(), "hello");
    }
}
