//! Stream consumer
//!
//! Drives one graph execution and exposes it as a pull-based chunk sequence.
//! All timing lives here: the global turn budget, the tool-round budget, and
//! the boundary rule that time is only observed between steps.

use super::interpreter::{interpret, ContentDigest, StepAction};
use crate::graph::{ConversationState, DialogueGraph, GraphExecution};
use crate::message::truncate_chars;
use sha2::{Digest, Sha256};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Wall-clock budget for one whole turn
pub const GLOBAL_BUDGET: Duration = Duration::from_secs(120);

/// Budget for one tool round to resolve
pub const TOOL_BUDGET: Duration = Duration::from_secs(60);

const ERROR_CHUNK_LIMIT: usize = 100;

pub(crate) const INTERRUPTED_NOTICE: &str = "This took longer than expected, so I had to \
     stop early — the above is what I found before time ran out.";
pub(crate) const TOOL_TIMEOUT_NOTICE: &str = "The operation timed out. The storefront may \
     be slow or temporarily unavailable — please try again in a moment.";
pub(crate) const FALLBACK_APOLOGY: &str = "Sorry, I was not able to come up with a reply. \
     Please check your connection and try again.";

/// Per-conversation streaming state.
///
/// Passed by reference into every turn; `reset` runs exactly at
/// new-conversation boundaries.
#[derive(Debug, Default)]
pub struct StreamContext {
    turn_counter: u64,
    emitted: HashSet<ContentDigest>,
    last_signature: Option<ContentDigest>,
}

impl StreamContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.turn_counter = 0;
        self.emitted.clear();
        self.last_signature = None;
        tracing::debug!("Stream context reset");
    }

    pub fn turn_counter(&self) -> u64 {
        self.turn_counter
    }
}

/// Signature identifying one submission: the turn counter plus the query
/// entries. Deliberately excludes wall-clock time so resubmissions of the
/// same turn actually collide.
pub fn request_signature(turn_counter: u64, query: &[String]) -> ContentDigest {
    let mut hasher = Sha256::new();
    hasher.update(turn_counter.to_le_bytes());
    for entry in query {
        hasher.update((entry.len() as u64).to_le_bytes());
        hasher.update(entry.as_bytes());
    }
    hasher.finalize().into()
}

/// How a chunk sequence ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Terminal step reached (collaborator failures that became terminal
    /// messages also land here)
    Completed,
    /// Suppressed as a duplicate submission; nothing was yielded
    DuplicateRequest,
    /// A tool round exceeded its budget; treated as a normal end
    ToolTimeout,
    /// The global budget ran out; the caller should render the turn as
    /// interrupted
    TimedOut,
    /// Graph execution itself failed
    Failed,
}

/// Begin streaming one turn. The sequence is lazy — nothing happens until
/// the first `next` call — and cannot be restarted once exhausted.
pub fn stream_turn<'a>(
    graph: &Arc<DialogueGraph>,
    initial: ConversationState,
    ctx: &'a mut StreamContext,
) -> ChunkStream<'a> {
    ChunkStream {
        execution: graph.execute(initial),
        ctx,
        started: None,
        tool_started: None,
        pending: VecDeque::new(),
        yielded_any: false,
        graph_done: false,
        outcome: None,
    }
}

/// Pull-based chunk sequence for one turn
pub struct ChunkStream<'a> {
    execution: GraphExecution,
    ctx: &'a mut StreamContext,
    started: Option<Instant>,
    tool_started: Option<Instant>,
    pending: VecDeque<String>,
    yielded_any: bool,
    graph_done: bool,
    outcome: Option<StreamOutcome>,
}

impl ChunkStream<'_> {
    /// Next chunk, or `None` once the sequence has ended. Cancellation is
    /// the caller simply not calling again.
    pub async fn next(&mut self) -> Option<String> {
        loop {
            if let Some(chunk) = self.pending.pop_front() {
                self.yielded_any = true;
                return Some(chunk);
            }
            if self.outcome.is_some() {
                return None;
            }

            let started = if let Some(started) = self.started {
                started
            } else {
                // First poll: duplicate-submission guard, then turn setup.
                let signature =
                    request_signature(self.ctx.turn_counter, &self.execution.state().query);
                if self.ctx.last_signature == Some(signature) {
                    tracing::warn!("Duplicate submission suppressed");
                    self.outcome = Some(StreamOutcome::DuplicateRequest);
                    return None;
                }
                self.ctx.last_signature = Some(signature);
                self.ctx.turn_counter += 1;
                self.ctx.emitted.clear();
                let now = Instant::now();
                self.started = Some(now);
                tracing::debug!(turn = self.ctx.turn_counter, "Turn started");
                now
            };

            if self.graph_done {
                return self.finish_exhausted();
            }
            if started.elapsed() >= GLOBAL_BUDGET {
                return self.finish_timed_out();
            }

            let step = if let Some(tool_started) = self.tool_started {
                let remaining = TOOL_BUDGET.saturating_sub(tool_started.elapsed());
                match tokio::time::timeout(remaining, self.execution.next_step()).await {
                    Ok(step) => step,
                    Err(_) => {
                        tracing::warn!("Tool round exceeded its budget, cancelling");
                        self.execution.cancel_token().cancel();
                        self.outcome = Some(StreamOutcome::ToolTimeout);
                        self.yielded_any = true;
                        return Some(TOOL_TIMEOUT_NOTICE.to_string());
                    }
                }
            } else {
                self.execution.next_step().await
            };

            let step = match step {
                Ok(Some(step)) => step,
                Ok(None) => {
                    self.graph_done = true;
                    continue;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Graph execution failed");
                    self.outcome = Some(StreamOutcome::Failed);
                    self.yielded_any = true;
                    return Some(format!(
                        "Something went wrong while handling your request. ({})",
                        truncate_chars(&e.to_string(), ERROR_CHUNK_LIMIT)
                    ));
                }
            };

            // The budget is re-checked between steps; a step that arrives
            // after the budget expired is dropped in favor of the notice.
            if started.elapsed() >= GLOBAL_BUDGET {
                return self.finish_timed_out();
            }

            match interpret(&step, &mut self.ctx.emitted) {
                StepAction::ToolStarted { notice } => {
                    if self.tool_started.is_none() {
                        self.tool_started = Some(Instant::now());
                    }
                    if let Some(notice) = notice {
                        self.yielded_any = true;
                        return Some(notice);
                    }
                }
                StepAction::Content { chunks } => {
                    self.tool_started = None;
                    self.pending.extend(chunks);
                }
                StepAction::Terminal { chunks } => {
                    self.tool_started = None;
                    self.pending.extend(chunks);
                    self.graph_done = true;
                }
            }
        }
    }

    /// Outcome of the sequence; `None` while it is still running
    pub fn outcome(&self) -> Option<StreamOutcome> {
        self.outcome
    }

    /// Conversation state as of the last executed node
    pub fn state(&self) -> &ConversationState {
        self.execution.state()
    }

    fn finish_exhausted(&mut self) -> Option<String> {
        self.outcome = Some(StreamOutcome::Completed);
        if self.yielded_any {
            None
        } else {
            self.yielded_any = true;
            Some(FALLBACK_APOLOGY.to_string())
        }
    }

    fn finish_timed_out(&mut self) -> Option<String> {
        self.outcome = Some(StreamOutcome::TimedOut);
        let notice = if self.yielded_any {
            INTERRUPTED_NOTICE
        } else {
            FALLBACK_APOLOGY
        };
        self.yielded_any = true;
        Some(notice.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::testing::{search_records_json, HangingTool, ScriptedReasoner, StaticTool};
    use crate::message::{ModelResponse, ToolCallRequest};
    use crate::prompt::WELCOME_MSG;
    use crate::reasoner::ReasonerError;
    use crate::tools::{Tool, ToolRegistry};
    use serde_json::{json, Map};

    fn graph_with(
        reasoner: ScriptedReasoner,
        tools: Vec<Arc<dyn Tool>>,
    ) -> Arc<DialogueGraph> {
        Arc::new(DialogueGraph::new(
            Arc::new(reasoner),
            ToolRegistry::with_tools(tools),
        ))
    }

    fn search_call() -> Vec<ToolCallRequest> {
        let mut args = Map::new();
        args.insert("keyword".to_string(), json!("phone"));
        vec![ToolCallRequest::new("product_search", args)]
    }

    async fn collect(stream: &mut ChunkStream<'_>) -> Vec<String> {
        let mut chunks = Vec::new();
        while let Some(chunk) = stream.next().await {
            chunks.push(chunk);
        }
        chunks
    }

    #[tokio::test]
    async fn empty_history_streams_exactly_the_welcome_message() {
        let graph = graph_with(ScriptedReasoner::new(vec![]), vec![]);
        let mut ctx = StreamContext::new();

        let mut stream = stream_turn(&graph, ConversationState::default(), &mut ctx);
        let chunks = collect(&mut stream).await;

        assert_eq!(chunks, vec![WELCOME_MSG.to_string()]);
        assert_eq!(stream.outcome(), Some(StreamOutcome::Completed));
    }

    #[tokio::test]
    async fn search_turn_streams_notice_then_one_table_chunk() {
        let graph = graph_with(
            ScriptedReasoner::new(vec![Ok(ModelResponse::with_tool_calls("", search_call()))]),
            vec![Arc::new(StaticTool::new(
                "product_search",
                search_records_json(3),
            ))],
        );
        let mut ctx = StreamContext::new();

        let initial = ConversationState::new_turn(vec![], "search for a phone");
        let mut stream = stream_turn(&graph, initial, &mut ctx);
        let chunks = collect(&mut stream).await;

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "Running product_search…");
        assert!(chunks[1].starts_with("Found 3 products"));
        assert_eq!(stream.outcome(), Some(StreamOutcome::Completed));
        assert!(stream.state().finished);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_tool_times_out_with_a_notice() {
        let graph = graph_with(
            ScriptedReasoner::new(vec![Ok(ModelResponse::with_tool_calls("", search_call()))]),
            vec![Arc::new(HangingTool::new("product_search"))],
        );
        let mut ctx = StreamContext::new();

        let initial = ConversationState::new_turn(vec![], "search for a phone");
        let mut stream = stream_turn(&graph, initial, &mut ctx);
        let chunks = collect(&mut stream).await;

        assert_eq!(chunks.last().unwrap(), TOOL_TIMEOUT_NOTICE);
        assert_eq!(stream.outcome(), Some(StreamOutcome::ToolTimeout));
    }

    #[tokio::test]
    async fn reasoner_failure_streams_one_truncated_error_chunk() {
        let graph = graph_with(
            ScriptedReasoner::new(vec![Err(ReasonerError::network("connection refused"))]),
            vec![],
        );
        let mut ctx = StreamContext::new();

        let initial = ConversationState::new_turn(vec![], "hello");
        let mut stream = stream_turn(&graph, initial, &mut ctx);
        let chunks = collect(&mut stream).await;

        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].contains("connection refused"));
        assert_eq!(stream.outcome(), Some(StreamOutcome::Completed));
        assert!(stream.state().finished);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_turn_is_interrupted_at_a_step_boundary() {
        // First step (reasoner) takes 70s and opens a tool round; the tool
        // itself takes 55s, inside its own budget, so the resolving step
        // lands past the global budget and is dropped for the notice.
        let graph = graph_with(
            ScriptedReasoner::new(vec![Ok(ModelResponse::with_tool_calls("", search_call()))])
                .with_delay(Duration::from_secs(70)),
            vec![Arc::new(
                StaticTool::new("product_search", search_records_json(1))
                    .with_delay(Duration::from_secs(55)),
            )],
        );
        let mut ctx = StreamContext::new();

        let initial = ConversationState::new_turn(vec![], "search for a phone");
        let started = Instant::now();
        let mut stream = stream_turn(&graph, initial, &mut ctx);
        let chunks = collect(&mut stream).await;

        assert_eq!(chunks.last().unwrap(), INTERRUPTED_NOTICE);
        assert_eq!(stream.outcome(), Some(StreamOutcome::TimedOut));
        // Bounded by the budget plus the in-flight step's own duration.
        assert!(started.elapsed() < GLOBAL_BUDGET + Duration::from_secs(60));
    }

    #[tokio::test]
    async fn empty_reply_falls_back_to_one_apology_chunk() {
        let graph = graph_with(
            ScriptedReasoner::new(vec![Ok(ModelResponse::text("   "))]),
            vec![],
        );
        let mut ctx = StreamContext::new();

        let initial = ConversationState::new_turn(vec![], "hello");
        let mut stream = stream_turn(&graph, initial, &mut ctx);
        let chunks = collect(&mut stream).await;

        assert_eq!(chunks, vec![FALLBACK_APOLOGY.to_string()]);
        assert_eq!(stream.outcome(), Some(StreamOutcome::Completed));
    }

    #[tokio::test]
    async fn duplicate_submission_yields_nothing() {
        let graph = graph_with(
            ScriptedReasoner::new(vec![Ok(ModelResponse::text("a reply"))]),
            vec![],
        );
        let mut ctx = StreamContext::new();
        let query = vec!["hello".to_string()];
        ctx.last_signature = Some(request_signature(ctx.turn_counter, &query));

        let initial = ConversationState {
            messages: vec![crate::message::RawMessage::user("hello")],
            query,
            finished: false,
        };
        let mut stream = stream_turn(&graph, initial, &mut ctx);
        let chunks = collect(&mut stream).await;

        assert!(chunks.is_empty());
        assert_eq!(stream.outcome(), Some(StreamOutcome::DuplicateRequest));
        assert_eq!(ctx.turn_counter(), 0);
    }

    #[tokio::test]
    async fn identical_tool_outputs_are_emitted_once() {
        // Two calls to the same tool produce byte-identical renderings; the
        // second is suppressed by the per-turn digest set.
        let mut calls = search_call();
        calls.extend(search_call());
        let graph = graph_with(
            ScriptedReasoner::new(vec![Ok(ModelResponse::with_tool_calls("", calls))]),
            vec![Arc::new(StaticTool::new(
                "product_search",
                search_records_json(2),
            ))],
        );
        let mut ctx = StreamContext::new();

        let initial = ConversationState::new_turn(vec![], "search for a phone");
        let mut stream = stream_turn(&graph, initial, &mut ctx);
        let chunks = collect(&mut stream).await;

        let tables = chunks.iter().filter(|c| c.starts_with("Found")).count();
        assert_eq!(tables, 1);
    }

    #[tokio::test]
    async fn emitted_set_resets_between_turns() {
        let graph = graph_with(
            ScriptedReasoner::new(vec![
                Ok(ModelResponse::text("same answer")),
                Ok(ModelResponse::text("same answer")),
            ]),
            vec![],
        );
        let mut ctx = StreamContext::new();

        for _ in 0..2 {
            let initial = ConversationState::new_turn(vec![], "hello");
            let mut stream = stream_turn(&graph, initial, &mut ctx);
            let chunks = collect(&mut stream).await;
            assert_eq!(chunks, vec!["same answer".to_string()]);
        }
        assert_eq!(ctx.turn_counter(), 2);
    }
}
