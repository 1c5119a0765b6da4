//! Host-level execution policy.

use serde::{Deserialize, Serialize};

/// How mutations decide whether to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    /// Consult change criteria before running a mutation
    pub idempotent: bool,
    /// Evaluate criteria at all; when off, every mutation runs
    pub check_state_first: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            idempotent: true,
            check_state_first: true,
        }
    }
}

impl Policy {
    /// Run every mutation unconditionally.
    pub fn always_apply() -> Self {
        Self {
            idempotent: false,
            check_state_first: false,
        }
    }
}
