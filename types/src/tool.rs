//! Tool names and tool call requests.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Separator between the provider id and the capability in a namespaced tool name.
pub const NAMESPACE_SEPARATOR: char = '.';

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolNameError {
    #[error("tool name must not be empty")]
    Empty,
    #[error("tool name must not contain whitespace: {0:?}")]
    Whitespace(String),
}

/// A validated tool name, usually namespaced as `<provider-id>.<capability>`.
///
/// Invariant: non-empty and free of whitespace. Names without a namespace are
/// accepted; `provider()` returns `None` for them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ToolName(String);

impl ToolName {
    pub fn new(raw: impl Into<String>) -> Result<Self, ToolNameError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(ToolNameError::Empty);
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(ToolNameError::Whitespace(raw));
        }
        Ok(Self(raw))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Provider (plugin) id: everything before the first separator.
    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        self.0
            .split_once(NAMESPACE_SEPARATOR)
            .map(|(provider, _)| provider)
            .filter(|provider| !provider.is_empty())
    }

    /// Capability: everything after the first separator, or the whole name.
    #[must_use]
    pub fn capability(&self) -> &str {
        self.0
            .split_once(NAMESPACE_SEPARATOR)
            .map_or(self.0.as_str(), |(_, capability)| capability)
    }

    /// Display name: the segment after the last separator.
    #[must_use]
    pub fn short_name(&self) -> &str {
        match self.0.rsplit_once(NAMESPACE_SEPARATOR) {
            Some((_, short)) if !short.is_empty() => short,
            _ => &self.0,
        }
    }
}

impl TryFrom<String> for ToolName {
    type Error = ToolNameError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl TryFrom<&str> for ToolName {
    type Error = ToolNameError;

    fn try_from(raw: &str) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<ToolName> for String {
    fn from(name: ToolName) -> Self {
        name.0
    }
}

impl AsRef<str> for ToolName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A capability invocation requested by the model.
///
/// Immutable once created: the orchestrator retries a denied call with the
/// exact same id and argument payload after approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    id: String,
    name: ToolName,
    #[serde(default)]
    arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: ToolName, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name,
            arguments,
        }
    }

    /// Correlation id from the model's request.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn name(&self) -> &ToolName {
        &self.name
    }

    #[must_use]
    pub fn arguments(&self) -> &serde_json::Value {
        &self.arguments
    }

    /// Look up a string argument by key.
    #[must_use]
    pub fn str_argument(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(serde_json::Value::as_str)
    }
}
