//! Streaming layer
//!
//! Turns the dialogue graph's step-by-step execution trace into the
//! deduplicated chunk sequence the front end consumes.

mod consumer;
mod interpreter;

pub use consumer::{
    request_signature, stream_turn, ChunkStream, StreamContext, StreamOutcome, GLOBAL_BUDGET,
    TOOL_BUDGET,
};
pub use interpreter::{content_digest, interpret, ContentDigest, StepAction, MIN_CHUNK_CHARS};
