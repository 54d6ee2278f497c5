//! Per-chunk reasoning rewrite.
//!
//! Everything here is pure: a parsed upstream chunk and the current open
//! flags go in, the chunk to emit and the next open flags come out.
use serde_json::{Map, Value};
use smallvec::SmallVec;

use crate::protocol::think::{THINK_CLOSE_STREAM, THINK_OPEN};

const REASONING_KEY: &str = "reasoning_content";
const CONTENT_KEY: &str = "content";

/// Choice indices whose reasoning segment is currently open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenSegments {
    indices: SmallVec<[u32; 2]>,
}

impl OpenSegments {
    #[must_use]
    pub fn is_open(&self, choice_index: u32) -> bool {
        self.indices.contains(&choice_index)
    }

    pub fn set(&mut self, choice_index: u32, open: bool) {
        let position = self.indices.iter().position(|index| *index == choice_index);
        match (position, open) {
            (None, true) => self.indices.push(choice_index),
            (Some(position), false) => {
                self.indices.remove(position);
            }
            _ => {}
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Remove and return every open index in ascending order.
    pub fn take_sorted(&mut self) -> SmallVec<[u32; 2]> {
        let mut indices = std::mem::take(&mut self.indices);
        indices.sort_unstable();
        indices
    }
}

/// Fragments carried by one choice delta. Empty strings count as absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaEvent<'a> {
    pub choice_index: u32,
    pub reasoning: Option<&'a str>,
    pub answer: Option<&'a str>,
    /// The delta has a `reasoning_content` key, whatever its value.
    pub has_reasoning_key: bool,
}

impl<'a> DeltaEvent<'a> {
    #[must_use]
    pub fn from_delta(choice_index: u32, delta: &'a Map<String, Value>) -> Self {
        let fragment = |key: &str| {
            delta
                .get(key)
                .and_then(Value::as_str)
                .filter(|text| !text.is_empty())
        };
        Self {
            choice_index,
            reasoning: fragment(REASONING_KEY),
            answer: fragment(CONTENT_KEY),
            has_reasoning_key: delta.contains_key(REASONING_KEY),
        }
    }
}

/// Result of folding one delta into the content stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    /// Replacement for `delta.content`; `None` keeps the original value.
    pub content: Option<String>,
    pub open: bool,
}

/// Merge reasoning and answer fragments into a single content fragment,
/// opening or closing the reasoning segment as needed.
#[must_use]
pub fn fold_delta(
    open: bool,
    reasoning: Option<&str>,
    answer: Option<&str>,
    show_reasoning: bool,
) -> Fold {
    let reasoning = reasoning.filter(|_| show_reasoning);
    if reasoning.is_none() && !(open && answer.is_some()) {
        return Fold {
            content: None,
            open,
        };
    }

    let mut content = String::new();
    let mut open = open;
    if let Some(reasoning) = reasoning {
        if !open {
            content.push_str(THINK_OPEN);
            open = true;
        }
        content.push_str(reasoning);
    }
    if let Some(answer) = answer {
        if open {
            content.push_str(THINK_CLOSE_STREAM);
            open = false;
        }
        content.push_str(answer);
    }
    Fold {
        content: Some(content),
        open,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChunkRewrite {
    /// Nothing to change; forward the frame as received.
    Unchanged,
    Rewritten { chunk: Value, open: OpenSegments },
}

/// Rewrite every choice delta of `chunk`: fold reasoning into content and
/// strip `reasoning_content`.
#[must_use]
pub fn rewrite_chunk(mut chunk: Value, open: &OpenSegments, show_reasoning: bool) -> ChunkRewrite {
    let Some(choices) = chunk.get_mut("choices").and_then(Value::as_array_mut) else {
        return ChunkRewrite::Unchanged;
    };

    let mut next = open.clone();
    let mut changed = false;
    for (position, choice) in choices.iter_mut().enumerate() {
        let choice_index = choice
            .get("index")
            .and_then(Value::as_u64)
            .and_then(|index| u32::try_from(index).ok())
            .unwrap_or_else(|| u32::try_from(position).unwrap_or(u32::MAX));
        let Some(delta) = choice.get_mut("delta").and_then(Value::as_object_mut) else {
            continue;
        };

        let event = DeltaEvent::from_delta(choice_index, delta);
        let fold = fold_delta(
            next.is_open(choice_index),
            event.reasoning,
            event.answer,
            show_reasoning,
        );
        let has_reasoning_key = event.has_reasoning_key;
        next.set(choice_index, fold.open);

        if has_reasoning_key {
            delta.remove(REASONING_KEY);
            changed = true;
        }
        if let Some(content) = fold.content {
            delta.insert(CONTENT_KEY.to_string(), Value::String(content));
            changed = true;
        }
    }

    if changed {
        ChunkRewrite::Rewritten { chunk, open: next }
    } else {
        ChunkRewrite::Unchanged
    }
}
