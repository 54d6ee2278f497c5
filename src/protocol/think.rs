//! Delimiters that mark reasoning output inside answer content.

/// Opens a reasoning segment.
pub const THINK_OPEN: &str = "<think>\n";

/// Closes a reasoning segment in streamed content. The reasoning text has
/// already been emitted fragment by fragment, so no newline is forced
/// before the tag.
pub const THINK_CLOSE_STREAM: &str = "</think>\n\n";

/// Closes a reasoning segment in a complete (non-streamed) message.
pub const THINK_CLOSE_BLOCK: &str = "\n</think>\n\n";

/// Prefix `answer` with `reasoning` wrapped in think delimiters.
#[must_use]
pub fn wrap_reasoning(reasoning: &str, answer: &str) -> String {
    let mut out = String::with_capacity(
        THINK_OPEN.len() + reasoning.len() + THINK_CLOSE_BLOCK.len() + answer.len(),
    );
    out.push_str(THINK_OPEN);
    out.push_str(reasoning);
    out.push_str(THINK_CLOSE_BLOCK);
    out.push_str(answer);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_reasoning() {
        assert_eq!(wrap_reasoning("r", "c"), "<think>\nr\n</think>\n\nc");
        assert_eq!(wrap_reasoning("r", ""), "<think>\nr\n</think>\n\n");
    }
}
