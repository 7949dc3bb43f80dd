//! Step classification
//!
//! Each step record classifies as exactly one of: a tool round starting, new
//! assistant content, or a terminal step. The terminal check runs last so
//! content produced by the terminal step still reaches the consumer.

use crate::graph::StepRecord;
use crate::message::{normalize, SpeakerRole};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Strings shorter than this (after trimming) are noise, not content
pub const MIN_CHUNK_CHARS: usize = 2;

/// Digest of one emitted chunk, for per-turn deduplication
pub type ContentDigest = [u8; 32];

pub fn content_digest(content: &str) -> ContentDigest {
    Sha256::digest(content.as_bytes()).into()
}

/// What the consumer should do with one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    /// A tool round began; `notice` is the transient progress line, absent
    /// when the same notice was already emitted this turn
    ToolStarted { notice: Option<String> },
    /// New assistant content to emit, already deduplicated
    Content { chunks: Vec<String> },
    /// Flush these chunks, then stop
    Terminal { chunks: Vec<String> },
}

/// Classify one step against the turn's emitted-set.
///
/// Inserts the digests of everything it returns, so replaying the same step
/// yields its content exactly once.
pub fn interpret(step: &StepRecord, emitted: &mut HashSet<ContentDigest>) -> StepAction {
    if let Some(first) = step.tool_calls.first() {
        let notice = format!("Running {}…", first.name);
        let fresh = emitted.insert(content_digest(&notice));
        return StepAction::ToolStarted {
            notice: fresh.then_some(notice),
        };
    }

    let mut chunks = Vec::new();
    for raw in step.raw_messages() {
        let Some(utterance) = normalize(raw) else {
            continue;
        };
        if utterance.role != SpeakerRole::Assistant {
            continue;
        }
        if utterance.content.chars().count() < MIN_CHUNK_CHARS {
            continue;
        }
        if emitted.insert(content_digest(&utterance.content)) {
            chunks.push(utterance.content);
        }
    }

    if step.finished {
        StepAction::Terminal { chunks }
    } else {
        StepAction::Content { chunks }
    }
}
