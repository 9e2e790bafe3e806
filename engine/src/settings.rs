//! Resolved orchestrator settings.
//!
//! Raw TOML structs (with `Option` fields) stay in `config`. The loader
//! resolves them here at the parse boundary so the state machine never
//! re-checks defaults.

use std::collections::HashSet;

use toolgate_types::ToolName;

use crate::config::ToolgateConfig;

/// Rounds allowed per turn when the config does not say.
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Approval policy consulted by the permission gate before the ledger.
#[derive(Debug, Clone)]
pub struct ApprovalPolicy {
    require_approval: bool,
    allowlist: HashSet<ToolName>,
}

impl ApprovalPolicy {
    #[must_use]
    pub fn new(require_approval: bool, allowlist: impl IntoIterator<Item = ToolName>) -> Self {
        Self {
            require_approval,
            allowlist: allowlist.into_iter().collect(),
        }
    }

    /// Every call needs a ledger grant; no global allow-list.
    #[must_use]
    pub fn strict() -> Self {
        Self::new(true, [])
    }

    #[must_use]
    pub fn require_approval(&self) -> bool {
        self.require_approval
    }

    #[must_use]
    pub fn is_allowlisted(&self, tool: &ToolName) -> bool {
        self.allowlist.contains(tool)
    }
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self::strict()
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub policy: ApprovalPolicy,
    /// Effective ceiling: always >= 1, and 1 when multi-step is disabled.
    max_iterations: u32,
    multi_step: bool,
}

impl OrchestratorSettings {
    #[must_use]
    pub fn new(policy: ApprovalPolicy, max_iterations: u32) -> Self {
        Self {
            policy,
            max_iterations: max_iterations.max(1),
            multi_step: true,
        }
    }

    /// One round per turn; follow-up calls are dropped instead of counted
    /// against a ceiling.
    #[must_use]
    pub fn single_step(policy: ApprovalPolicy) -> Self {
        Self {
            multi_step: false,
            ..Self::new(policy, 1)
        }
    }

    #[must_use]
    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    #[must_use]
    pub fn multi_step(&self) -> bool {
        self.multi_step
    }

    /// Resolve raw config into settings, logging and skipping invalid entries.
    #[must_use]
    pub fn from_config(config: Option<&ToolgateConfig>) -> Self {
        let Some(tools) = config.and_then(|cfg| cfg.tools.as_ref()) else {
            return Self::default();
        };

        let allowlist = tools
            .approval
            .iter()
            .flat_map(|approval| approval.allowlist.iter())
            .filter_map(|raw| match ToolName::new(raw.as_str()) {
                Ok(name) => Some(name),
                Err(e) => {
                    tracing::warn!("Ignoring invalid allowlist entry {raw:?}: {e}");
                    None
                }
            });
        let policy = ApprovalPolicy::new(tools.require_approval, allowlist);

        let configured = tools.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS);
        if configured == 0 {
            tracing::warn!("tools.max_iterations = 0 is not allowed; using 1");
        }
        if !tools.enable_multi_step {
            return Self::single_step(policy);
        }
        Self::new(policy, configured)
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::new(ApprovalPolicy::strict(), DEFAULT_MAX_ITERATIONS)
    }
}
