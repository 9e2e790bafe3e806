//! Two-tier allow-list for one conversation.
//!
//! The persistent tier mirrors the conversation record's durable list; a
//! grant only marks the mirror dirty and the session store flushes it. The
//! ephemeral tier is owned by the in-flight turn and drained when it ends.

use std::collections::HashSet;

use toolgate_types::{AllowTier, ToolName};

/// Per-conversation allow-list.
///
/// Invariant: a name is in at most one tier.
#[derive(Debug, Clone, Default)]
pub struct AllowListLedger {
    /// Insertion-ordered so the flushed list is stable.
    persistent: Vec<ToolName>,
    ephemeral: HashSet<ToolName>,
    dirty: bool,
}

impl AllowListLedger {
    /// Seed the persistent tier from the conversation record.
    #[must_use]
    pub fn new(persistent: impl IntoIterator<Item = ToolName>) -> Self {
        let mut ledger = Self::default();
        for name in persistent {
            if !ledger.persistent.contains(&name) {
                ledger.persistent.push(name);
            }
        }
        ledger
    }

    #[must_use]
    pub fn is_allowed(&self, name: &ToolName) -> bool {
        self.tier_of(name).is_some()
    }

    #[must_use]
    pub fn tier_of(&self, name: &ToolName) -> Option<AllowTier> {
        if self.persistent.contains(name) {
            Some(AllowTier::Persistent)
        } else if self.ephemeral.contains(name) {
            Some(AllowTier::Ephemeral)
        } else {
            None
        }
    }

    /// Record a grant. Returns `true` if the ledger changed.
    ///
    /// Promoting to `Persistent` drops the ephemeral copy. An ephemeral grant
    /// for a name that is already persistent is a no-op.
    pub fn grant(&mut self, name: ToolName, tier: AllowTier) -> bool {
        match tier {
            AllowTier::Persistent => {
                self.ephemeral.remove(&name);
                if self.persistent.contains(&name) {
                    return false;
                }
                tracing::debug!(tool = %name, "Persistent grant");
                self.persistent.push(name);
                self.dirty = true;
                true
            }
            AllowTier::Ephemeral => {
                if self.persistent.contains(&name) {
                    return false;
                }
                tracing::debug!(tool = %name, "Ephemeral grant");
                self.ephemeral.insert(name)
            }
        }
    }

    pub fn revoke_ephemeral(&mut self, name: &ToolName) -> bool {
        self.ephemeral.remove(name)
    }

    /// Drop every ephemeral grant; returns how many were removed.
    pub fn clear_all_ephemeral(&mut self) -> usize {
        let cleared = self.ephemeral.len();
        self.ephemeral.clear();
        cleared
    }

    #[must_use]
    pub fn persistent(&self) -> &[ToolName] {
        &self.persistent
    }

    #[must_use]
    pub fn ephemeral_len(&self) -> usize {
        self.ephemeral.len()
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Hand the persistent list to the session store and lower the dirty flag.
    pub fn take_dirty(&mut self) -> Option<Vec<ToolName>> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        Some(self.persistent.clone())
    }
}
