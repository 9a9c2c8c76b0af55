//! Invocation lifecycle.

use serde::{Deserialize, Serialize};

/// Where an invocation is in its lifecycle.
///
/// ```text
/// PENDING → VALIDATING → {VALIDATION_FAILED | DISPATCHING}
///                                 DISPATCHING → EXECUTING → {SUCCEEDED | FAILED}
/// ```
///
/// Lookup misses fail straight from `Pending`; credential failures and
/// cancellation before execution fail from `Dispatching`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvocationState {
    Pending,
    Validating,
    ValidationFailed,
    Dispatching,
    Executing,
    Succeeded,
    Failed,
}

impl InvocationState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            InvocationState::ValidationFailed | InvocationState::Succeeded | InvocationState::Failed
        )
    }

    /// Check if transition is valid.
    pub fn can_transition_to(self, to: InvocationState) -> bool {
        use InvocationState::*;
        match (self, to) {
            (Pending, Validating) => true,
            (Pending, Failed) => true, // unknown tool
            (Validating, ValidationFailed) => true,
            (Validating, Dispatching) => true,
            (Dispatching, Executing) => true,
            (Dispatching, Failed) => true,
            (Executing, Succeeded) => true,
            (Executing, Failed) => true,
            _ => false,
        }
    }

    /// Move to `to`, tracing the transition. Invalid moves are logged and
    /// ignored.
    pub(crate) fn advance(&mut self, to: InvocationState) {
        if self.can_transition_to(to) {
            tracing::trace!(from = ?*self, to = ?to, "invocation transition");
            *self = to;
        } else {
            tracing::warn!(from = ?*self, to = ?to, "invalid invocation transition ignored");
        }
    }
}
