//! Agent-facing types: descriptors, the dispatch contract, and responses.

pub mod descriptor;
pub mod handler;
pub mod provider;
pub mod response;

pub use descriptor::{AgentDescriptor, AgentStatus};
pub use handler::{AgentHandler, EnrichedContext, FnHandler};
pub use provider::{FallbackProvider, OpenAICompatibleProvider};
pub use response::{AgentResponse, ErrorKind};

/// Truncate a string to `max_len` bytes at a char boundary, collapsing
/// newlines so log lines stay on one line.
pub fn truncate(s: &str, max_len: usize) -> String {
    let s = s.replace('\n', " ");
    if s.len() <= max_len {
        s
    } else {
        let target_len = max_len.saturating_sub(3);
        let mut end = target_len;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_short_strings_intact() {
        assert_eq!(truncate("hello", 10), "hello");
    }

    #[test]
    fn truncate_collapses_newlines_and_caps_length() {
        let s = "line one\nline two\nline three";
        let t = truncate(s, 12);
        assert!(!t.contains('\n'));
        assert!(t.len() <= 12);
        assert!(t.ends_with("..."));
    }
}
