//! Permission gate: run now, or suspend and ask the operator.
//!
//! Stateless. It reads the approval policy and the ledger and has no side
//! effects; the orchestrator applies whatever the verdict implies.

use serde_json::Value;

use toolgate_types::{
    ContextMessage, ToolCall, first_sentence, last_assistant_text, sanitize_display_text,
    truncate_with_ellipsis,
};

use crate::ledger::AllowListLedger;
use crate::settings::ApprovalPolicy;

/// Assistant text at or above this length is treated as a previous answer,
/// not reasoning about the pending call.
const REASONING_MAX_CHARS: usize = 150;
/// A period must appear before this many chars to count as a first sentence.
const SENTENCE_MAX_CHARS: usize = 100;
const DETAIL_MAX_CHARS: usize = 200;
const PURPOSE_MAX_CHARS: usize = 200;

/// Argument keys surfaced in the permission prompt, in display order.
const DETAIL_KEYS: &[&str] = &["path", "file", "command", "url", "query", "content", "data"];

/// One displayable argument of a pending call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentDetail {
    pub key: String,
    pub value: String,
}

/// A suspended decision point awaiting the operator.
#[derive(Debug, Clone, PartialEq)]
pub struct PermissionRequest {
    pub call: ToolCall,
    pub purpose: String,
    pub details: Vec<ArgumentDetail>,
    /// Context the round resumes with if approved.
    pub context: Vec<ContextMessage>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateVerdict {
    Allowed,
    Denied(Box<PermissionRequest>),
}

#[cfg(test)]
impl GateVerdict {
    fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PermissionGate<'a> {
    policy: &'a ApprovalPolicy,
}

impl<'a> PermissionGate<'a> {
    #[must_use]
    pub fn new(policy: &'a ApprovalPolicy) -> Self {
        Self { policy }
    }

    /// Evaluate one call. Membership in either ledger tier is sufficient.
    #[must_use]
    pub fn evaluate(
        &self,
        call: &ToolCall,
        ledger: &AllowListLedger,
        context: &[ContextMessage],
    ) -> GateVerdict {
        if !self.policy.require_approval()
            || self.policy.is_allowlisted(call.name())
            || ledger.is_allowed(call.name())
        {
            return GateVerdict::Allowed;
        }

        GateVerdict::Denied(Box::new(PermissionRequest {
            call: call.clone(),
            purpose: extract_purpose(context, call),
            details: argument_details(call.arguments()),
            context: context.to_vec(),
        }))
    }
}

/// Why the model wants to make `call`, for the operator.
///
/// Prefers short fresh reasoning from the preceding assistant message, then
/// well-known argument shapes, then the capability name.
#[must_use]
pub fn extract_purpose(context: &[ContextMessage], call: &ToolCall) -> String {
    if let Some(reasoning) = last_assistant_text(context)
        && reasoning.chars().count() < REASONING_MAX_CHARS
    {
        let sentence = first_sentence(reasoning, SENTENCE_MAX_CHARS).unwrap_or(reasoning);
        return display_text(sentence, PURPOSE_MAX_CHARS);
    }

    if let Some(purpose) = purpose_from_arguments(call) {
        return display_text(&purpose, PURPOSE_MAX_CHARS);
    }

    format!("Execute {}", call.name().capability())
}

/// Purpose of a completed step without a tool call to inspect.
#[must_use]
pub fn extract_step_purpose(context: &[ContextMessage]) -> String {
    let Some(content) = last_assistant_text(context) else {
        return "Processing response".to_string();
    };
    let text = first_sentence(content, SENTENCE_MAX_CHARS).unwrap_or(content);
    display_text(text, SENTENCE_MAX_CHARS + 3)
}

fn purpose_from_arguments(call: &ToolCall) -> Option<String> {
    if let Some(query) = call.str_argument("query") {
        return Some(format!("Search for: {query}"));
    }
    if let Some(url) = call.str_argument("url") {
        return Some(format!("Read URL: {url}"));
    }
    if let Some(path) = call
        .str_argument("path")
        .or_else(|| call.str_argument("file"))
    {
        return Some(format!("Access file: {path}"));
    }
    call.str_argument("command")
        .map(|command| format!("Execute: {command}"))
}

/// Structured summary of the well-known arguments of a call.
#[must_use]
pub fn argument_details(arguments: &Value) -> Vec<ArgumentDetail> {
    DETAIL_KEYS
        .iter()
        .filter_map(|key| {
            let value = arguments.get(*key)?;
            let raw = match value {
                Value::String(s) => s.clone(),
                other => serde_json::to_string(other).ok()?,
            };
            Some(ArgumentDetail {
                key: (*key).to_string(),
                value: display_text(&raw, DETAIL_MAX_CHARS),
            })
        })
        .collect()
}

fn display_text(raw: &str, max: usize) -> String {
    truncate_with_ellipsis(&sanitize_display_text(raw), max)
}
