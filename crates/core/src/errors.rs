use thiserror::Error;

use crate::domain::expense::{ExpenseId, ExpenseStatus};
use crate::domain::policy::PolicyId;
use crate::domain::user::UserId;

/// Failures of the approval engine proper. Every variant is a synchronous
/// return-style failure; nothing here is retried internally.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApprovalError {
    #[error("no approval policy is bound to user `{user_id}`")]
    PolicyNotFound { user_id: UserId },
    #[error("policy `{policy_id}` resolves to an empty approver chain")]
    EmptyApproverChain { policy_id: PolicyId },
    #[error("expense is {actual:?} but the operation requires {required:?}")]
    InvalidState { required: ExpenseStatus, actual: ExpenseStatus },
    #[error("approver `{approver_id}` is not currently eligible: {reason}")]
    NotEligible { approver_id: UserId, reason: String },
    #[error("stored policy `{policy_id}` is invalid: {reason}")]
    InvalidPolicy { policy_id: PolicyId, reason: String },
    #[error("expense `{expense_id}` is submitted but carries no chain snapshot")]
    MissingChain { expense_id: ExpenseId },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid expense transition from {from:?} to {to:?}")]
    InvalidExpenseTransition { from: ExpenseStatus, to: ExpenseStatus },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}
