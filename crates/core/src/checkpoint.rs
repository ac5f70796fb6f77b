// SPDX-License-Identifier: Apache-2.0

//! Checkpoint filter: the sentinel that marks a turn as internal
//! housekeeping rather than customer-visible output. Shared by the agent
//! event handler and the fanout/output-delivery paths so both sides of
//! the filter agree.

/// Real deployments configure this per-project; a fixed sentinel keeps
/// the filter testable without that plumbing.
pub const CHECKPOINT_MARKER: &str = "<<checkpoint>>";

pub fn is_checkpoint_response(text: &str) -> bool {
    text.contains(CHECKPOINT_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_marker_anywhere_in_text() {
        assert!(is_checkpoint_response("turn done <<checkpoint>>"));
        assert!(!is_checkpoint_response("turn done"));
    }
}
