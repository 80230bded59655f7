//! Restaurant-operator approval.
//!
//! Operators register as `pending` and cannot log in until an administrator
//! approves them. A decision is final: `approved` and `rejected` are terminal.

use chrono::{DateTime, Utc};
use dishpatch_core::PrincipalId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::messages::{APPROVAL_REJECTED, PENDING_APPROVAL};
use super::token::AuthContext;

/// Where an operator stands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalState {
    /// Awaiting a decision.
    #[default]
    Pending,
    /// Allowed to log in.
    Approved,
    /// Turned down.
    Rejected,
}

impl std::fmt::Display for ApprovalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        })
    }
}

/// A decision an administrator can make.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalDecision {
    /// Let the operator in.
    Approve,
    /// Turn the operator down.
    Reject {
        /// Optional note kept on the record.
        reason: Option<String>,
    },
}

/// A decision together with who made it and when.
#[derive(Debug, Clone)]
pub struct ApprovalCommand {
    /// What was decided.
    pub decision: ApprovalDecision,
    /// Who decided.
    pub actor: AuthContext,
    /// When.
    pub at: DateTime<Utc>,
}

/// Approval transition failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApprovalError {
    /// The operator was already approved or rejected.
    #[error("restaurant operator already {0}")]
    AlreadyDecided(ApprovalState),

    /// The actor does not hold an administrator role.
    #[error("only administrators can decide approvals")]
    NotPermitted,
}

/// Approval record kept on every restaurant operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Approval {
    /// Current state.
    pub state: ApprovalState,
    /// Administrator who approved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<PrincipalId>,
    /// When approval happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    /// Administrator who rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_by: Option<PrincipalId>,
    /// When rejection happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_at: Option<DateTime<Utc>>,
    /// Why.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

impl Approval {
    /// A fresh, undecided approval.
    #[must_use]
    pub fn pending() -> Self {
        Self::default()
    }

    /// Apply a decision.
    ///
    /// # Errors
    ///
    /// Returns `ApprovalError::NotPermitted` unless `command.actor` is an
    /// administrator, and `ApprovalError::AlreadyDecided` unless the approval
    /// is still pending. Neither error modifies `self`.
    pub fn decide(&mut self, command: &ApprovalCommand) -> Result<(), ApprovalError> {
        if !command.actor.role.is_admin() {
            return Err(ApprovalError::NotPermitted);
        }
        if self.state != ApprovalState::Pending {
            return Err(ApprovalError::AlreadyDecided(self.state));
        }

        match &command.decision {
            ApprovalDecision::Approve => {
                self.state = ApprovalState::Approved;
                self.approved_by = Some(command.actor.principal_id);
                self.approved_at = Some(command.at);
            }
            ApprovalDecision::Reject { reason } => {
                self.state = ApprovalState::Rejected;
                self.rejected_by = Some(command.actor.principal_id);
                self.rejected_at = Some(command.at);
                self.rejection_reason.clone_from(reason);
            }
        }

        Ok(())
    }

    /// Why this approval blocks login, if it does.
    #[must_use]
    pub const fn login_block(&self) -> Option<&'static str> {
        match self.state {
            ApprovalState::Pending => Some(PENDING_APPROVAL),
            ApprovalState::Approved => None,
            ApprovalState::Rejected => Some(APPROVAL_REJECTED),
        }
    }
}
