//! Core domain types for Toolgate.
//!
//! Pure domain types shared by the engine and the binary: no IO, no async.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod context;
mod conversation;
mod ids;
mod permission;
mod text;
mod tool;

pub use context::{ContextMessage, Role, last_assistant_text};
pub use conversation::ConversationRecord;
pub use ids::{ConversationId, RoundId};
pub use permission::{AllowTier, PermissionDecision};
pub use text::{first_sentence, sanitize_display_text, truncate_with_ellipsis};
pub use tool::{NAMESPACE_SEPARATOR, ToolCall, ToolName, ToolNameError};
