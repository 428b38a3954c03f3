use std::collections::HashSet;

use crate::domain::decision::ApprovalDecision;
use crate::domain::expense::{Expense, ExpenseStatus};
use crate::domain::user::UserId;
use crate::engine::chain::{ApproverChain, EvaluationRule};
use crate::errors::ApprovalError;

/// The approvers currently authorized to record a decision, derived by
/// scanning the decision list against the chain snapshot. There is no
/// stored "current step" pointer anywhere that could drift out of sync.
pub fn eligible_set(chain: &ApproverChain, decisions: &[ApprovalDecision]) -> Vec<UserId> {
    let decided: HashSet<&UserId> = decisions.iter().map(|decision| &decision.approver_id).collect();

    match chain.rule() {
        EvaluationRule::Sequential => chain
            .members()
            .iter()
            .find(|member| !decided.contains(member))
            .cloned()
            .into_iter()
            .collect(),
        EvaluationRule::Parallel { .. } => chain
            .members()
            .iter()
            .filter(|member| !decided.contains(member))
            .cloned()
            .collect(),
    }
}

/// Validates that `approver_id` may act right now and returns their chain
/// position. Distinguishes the three ineligibility causes so callers get an
/// actionable reason.
pub fn check_eligibility(
    chain: &ApproverChain,
    decisions: &[ApprovalDecision],
    approver_id: &UserId,
) -> Result<usize, ApprovalError> {
    let Some(position) = chain.position_of(approver_id) else {
        return Err(ApprovalError::NotEligible {
            approver_id: approver_id.clone(),
            reason: "not part of the approver chain".to_string(),
        });
    };

    if decisions.iter().any(|decision| &decision.approver_id == approver_id) {
        return Err(ApprovalError::NotEligible {
            approver_id: approver_id.clone(),
            reason: "already decided".to_string(),
        });
    }

    if !eligible_set(chain, decisions).contains(approver_id) {
        return Err(ApprovalError::NotEligible {
            approver_id: approver_id.clone(),
            reason: format!("not their turn (chain position {position})"),
        });
    }

    Ok(position)
}

/// Pure pre-check used by callers to filter pending-approval lists without
/// touching state.
pub struct DecisionValidator;

impl DecisionValidator {
    pub fn is_eligible(expense: &Expense, approver_id: &UserId) -> bool {
        if expense.status != ExpenseStatus::Submitted {
            return false;
        }
        let Some(chain) = &expense.chain else {
            return false;
        };
        check_eligibility(chain, &expense.decisions, approver_id).is_ok()
    }
}

/// Convenience alias of [`DecisionValidator::is_eligible`].
pub fn is_eligible(expense: &Expense, approver_id: &UserId) -> bool {
    DecisionValidator::is_eligible(expense, approver_id)
}
