//! Allow-list tiers and operator permission decisions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which tier of the allow-list a grant lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllowTier {
    /// Saved with the conversation; valid across turns.
    Persistent,
    /// Valid only for the remainder of the current turn.
    Ephemeral,
}

impl AllowTier {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Persistent => "persistent",
            Self::Ephemeral => "ephemeral",
        }
    }
}

impl fmt::Display for AllowTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator answer to a permission request.
///
/// `always_allow` is only meaningful when `approved` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PermissionDecision {
    pub approved: bool,
    #[serde(default)]
    pub always_allow: bool,
}

impl PermissionDecision {
    #[must_use]
    pub const fn approve_once() -> Self {
        Self {
            approved: true,
            always_allow: false,
        }
    }

    #[must_use]
    pub const fn always_allow() -> Self {
        Self {
            approved: true,
            always_allow: true,
        }
    }

    #[must_use]
    pub const fn deny() -> Self {
        Self {
            approved: false,
            always_allow: false,
        }
    }

    /// Tier the approved tool should be granted in, `None` when denied.
    #[must_use]
    pub const fn grant_tier(self) -> Option<AllowTier> {
        match (self.approved, self.always_allow) {
            (false, _) => None,
            (true, true) => Some(AllowTier::Persistent),
            (true, false) => Some(AllowTier::Ephemeral),
        }
    }

    /// Parse an operator keystroke: `y` once, `a` always, `n` deny.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => Some(Self::approve_once()),
            "a" | "always" => Some(Self::always_allow()),
            "n" | "no" => Some(Self::deny()),
            _ => None,
        }
    }
}
