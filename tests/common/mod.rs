//! Shared test utilities and fixtures
//!
//! Scripted operators and executors for driving whole turns.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use toolgate_engine::{
    ContextMessage, ConversationId, ConversationRecord, ExecFut, OperatorPrompt,
    PermissionDecision, PermissionRequest, PromptFut, RoundOutput, ToolCall, ToolExecutor,
    ToolName, TranscriptEvent, TranscriptSink, TurnInput,
};

pub fn name(raw: &str) -> ToolName {
    ToolName::new(raw).unwrap()
}

pub fn search_call(id: &str) -> ToolCall {
    ToolCall::new(id, name("search.web"), json!({"query": "weather in Lisbon"}))
}

pub fn record(id: &str, allowed: &[&str]) -> ConversationRecord {
    ConversationRecord {
        id: ConversationId::new(id),
        allowed_tools: allowed.iter().map(|raw| name(raw)).collect(),
    }
}

pub fn turn(calls: Vec<ToolCall>) -> TurnInput {
    TurnInput {
        tool_calls: calls,
        context: vec![ContextMessage::assistant("Let me check the forecast.")],
    }
}

/// Answers prompts from a queue; denies once the queue is empty.
#[derive(Default)]
pub struct QueuedOperator {
    decisions: Mutex<VecDeque<PermissionDecision>>,
    pub asked: Mutex<Vec<PermissionRequest>>,
}

impl QueuedOperator {
    pub fn new(decisions: impl IntoIterator<Item = PermissionDecision>) -> Arc<Self> {
        Arc::new(Self {
            decisions: Mutex::new(decisions.into_iter().collect()),
            asked: Mutex::new(Vec::new()),
        })
    }

    pub fn times_asked(&self) -> usize {
        self.asked.lock().unwrap().len()
    }
}

impl OperatorPrompt for QueuedOperator {
    fn decide(&self, request: PermissionRequest) -> PromptFut {
        self.asked.lock().unwrap().push(request);
        let decision = self
            .decisions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(PermissionDecision::deny);
        Box::pin(async move { decision })
    }
}

/// Never answers; the prompt stays open until cancelled.
pub struct SilentOperator;

impl OperatorPrompt for SilentOperator {
    fn decide(&self, _request: PermissionRequest) -> PromptFut {
        Box::pin(std::future::pending::<PermissionDecision>())
    }
}

/// Sleeps, then reports a round. Records whether the sleep ever finished.
pub struct SlowExecutor {
    pub delay: Duration,
    pub started: AtomicUsize,
    pub finished: Arc<AtomicBool>,
}

impl SlowExecutor {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            started: AtomicUsize::new(0),
            finished: Arc::new(AtomicBool::new(false)),
        })
    }
}

impl ToolExecutor for SlowExecutor {
    fn execute(&self, _calls: Vec<ToolCall>, _context: Vec<ContextMessage>) -> ExecFut {
        self.started.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay;
        let finished = Arc::clone(&self.finished);
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            finished.store(true, Ordering::SeqCst);
            Ok(RoundOutput {
                chunks: vec!["late output".to_string()],
                ..RoundOutput::default()
            })
        })
    }
}

/// Keeps every event and output chunk it is handed.
#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<TranscriptEvent>,
    pub chunks: Vec<String>,
}

impl RecordingSink {
    pub fn count(&self, pred: impl Fn(&TranscriptEvent) -> bool) -> usize {
        self.events.iter().filter(|event| pred(event)).count()
    }
}

impl TranscriptSink for RecordingSink {
    fn emit(&mut self, event: &TranscriptEvent) {
        self.events.push(event.clone());
    }

    fn output(&mut self, chunk: &str) {
        self.chunks.push(chunk.to_string());
    }
}
