//! Policy engine trait

use crate::error::Result;
use crate::input::PolicyInput;
use async_trait::async_trait;

/// Outcome of a policy evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// Explicit false, undefined, or any non-boolean result
    Deny,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

impl From<bool> for Decision {
    fn from(allowed: bool) -> Self {
        if allowed {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }
}

/// A compiled, immutable policy program.
///
/// Implementations must be pure functions of the input document: no I/O, no
/// clock, no randomness. Retries rely on the same input always producing the
/// same decision.
#[async_trait]
pub trait PolicyEngine: Send + Sync + std::fmt::Debug {
    /// Evaluate the approval query against an input document
    async fn evaluate(&self, input: &PolicyInput<'_>) -> Result<Decision>;

    /// Names of the modules this program was built from
    fn modules(&self) -> Vec<String> {
        Vec::new()
    }
}
