use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::decision::{ApprovalDecision, DecisionAction};
use crate::domain::expense::{Expense, ExpenseStatus};
use crate::domain::policy::{ApprovalPolicy, RejectionMode};
use crate::domain::user::UserId;
use crate::engine::chain::{ApproverChain, ApproverChainBuilder, EvaluationRule};
use crate::engine::eligibility::{check_eligibility, eligible_set};
use crate::errors::ApprovalError;

/// What a boundary caller gets back from `submit` and `act`: the (possibly
/// terminal) status and the approvers who may act next.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalOutcome {
    pub status: ExpenseStatus,
    pub next_approvers: Vec<UserId>,
}

/// Drives the expense lifecycle: Draft -> Submitted -> Approved | Rejected.
///
/// The machine holds no state of its own; status and decisions live on the
/// expense, and eligibility is always recomputed from them. Callers are
/// responsible for serializing concurrent `act` calls per expense (the db
/// layer does this with a write transaction) and must run the eligibility
/// check inside that critical section, which `act` does by construction.
#[derive(Clone, Copy, Debug, Default)]
pub struct ApprovalStateMachine;

impl ApprovalStateMachine {
    pub fn new() -> Self {
        Self
    }

    /// Moves a Draft expense to Submitted, snapshotting the approver chain.
    pub fn submit(
        &self,
        expense: &mut Expense,
        policy: &ApprovalPolicy,
        submitter_manager_id: Option<&UserId>,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        if expense.status != ExpenseStatus::Draft {
            return Err(ApprovalError::InvalidState {
                required: ExpenseStatus::Draft,
                actual: expense.status,
            });
        }

        let chain = ApproverChainBuilder::build(policy, submitter_manager_id)?;
        let next_approvers = eligible_set(&chain, &[]);

        expense.chain = Some(chain);
        expense.decisions.clear();
        expense.transition_to(ExpenseStatus::Submitted).map_err(|_| {
            ApprovalError::InvalidState {
                required: ExpenseStatus::Draft,
                actual: expense.status,
            }
        })?;
        expense.updated_at = Utc::now();

        Ok(ApprovalOutcome { status: ExpenseStatus::Submitted, next_approvers })
    }

    /// Records one approver decision and re-evaluates completion.
    ///
    /// Eligibility is checked against the current decision list immediately
    /// before the append, so a caller that serializes access per expense
    /// gets exactly-once semantics for each chain slot.
    pub fn act(
        &self,
        expense: &mut Expense,
        approver_id: &UserId,
        action: DecisionAction,
        comment: Option<String>,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        if expense.status != ExpenseStatus::Submitted {
            return Err(ApprovalError::InvalidState {
                required: ExpenseStatus::Submitted,
                actual: expense.status,
            });
        }
        let Some(chain) = &expense.chain else {
            return Err(ApprovalError::MissingChain { expense_id: expense.id.clone() });
        };

        let position = check_eligibility(chain, &expense.decisions, approver_id)?;
        expense.decisions.push(ApprovalDecision::new(
            approver_id.clone(),
            action,
            comment,
            position,
        ));

        let outcome = match evaluate_completion(chain, &expense.decisions) {
            Some(terminal) => ApprovalOutcome { status: terminal, next_approvers: Vec::new() },
            None => ApprovalOutcome {
                status: ExpenseStatus::Submitted,
                next_approvers: eligible_set(chain, &expense.decisions),
            },
        };

        if outcome.status != expense.status {
            expense.transition_to(outcome.status).map_err(|_| ApprovalError::InvalidState {
                required: ExpenseStatus::Submitted,
                actual: expense.status,
            })?;
        }
        expense.updated_at = Utc::now();
        Ok(outcome)
    }

    pub fn submit_with_audit<S>(
        &self,
        expense: &mut Expense,
        policy: &ApprovalPolicy,
        submitter_manager_id: Option<&UserId>,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<ApprovalOutcome, ApprovalError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.submit(expense, policy, submitter_manager_id);
        match &result {
            Ok(outcome) => sink.emit(
                AuditEvent::new(
                    Some(expense.id.clone()),
                    audit.correlation_id.clone(),
                    "approval.submitted",
                    AuditCategory::Submission,
                    audit.actor.clone(),
                    AuditOutcome::Success,
                )
                .with_metadata("chain_len", expense.chain.as_ref().map_or(0, ApproverChain::len).to_string())
                .with_metadata("next_approvers", join_ids(&outcome.next_approvers)),
            ),
            Err(error) => sink.emit(
                AuditEvent::new(
                    Some(expense.id.clone()),
                    audit.correlation_id.clone(),
                    "approval.submit_rejected",
                    AuditCategory::Submission,
                    audit.actor.clone(),
                    AuditOutcome::Rejected,
                )
                .with_metadata("error", error.to_string()),
            ),
        }
        result
    }

    pub fn act_with_audit<S>(
        &self,
        expense: &mut Expense,
        approver_id: &UserId,
        action: DecisionAction,
        comment: Option<String>,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<ApprovalOutcome, ApprovalError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.act(expense, approver_id, action, comment);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        Some(expense.id.clone()),
                        audit.correlation_id.clone(),
                        "approval.decision_recorded",
                        AuditCategory::Decision,
                        audit.actor.clone(),
                        AuditOutcome::Success,
                    )
                    .with_metadata("approver", approver_id.0.clone())
                    .with_metadata("action", action.as_str()),
                );
                if outcome.status.is_terminal() {
                    sink.emit(
                        AuditEvent::new(
                            Some(expense.id.clone()),
                            audit.correlation_id.clone(),
                            "approval.resolved",
                            AuditCategory::Resolution,
                            audit.actor.clone(),
                            AuditOutcome::Success,
                        )
                        .with_metadata("status", outcome.status.as_str()),
                    );
                }
            }
            Err(error) => sink.emit(
                AuditEvent::new(
                    Some(expense.id.clone()),
                    audit.correlation_id.clone(),
                    "approval.decision_rejected",
                    AuditCategory::Decision,
                    audit.actor.clone(),
                    AuditOutcome::Rejected,
                )
                .with_metadata("approver", approver_id.0.clone())
                .with_metadata("error", error.to_string()),
            ),
        }
        result
    }
}

/// Decides whether the recorded decisions resolve the expense.
///
/// Sequential: any rejection is terminal; all members approved is Approved.
/// Parallel: integer cross-multiplication against the snapshot threshold,
/// with the full chain length as denominator. A vote that can no longer
/// reach the threshold resolves Rejected instead of stalling.
fn evaluate_completion(
    chain: &ApproverChain,
    decisions: &[ApprovalDecision],
) -> Option<ExpenseStatus> {
    let approved =
        decisions.iter().filter(|decision| decision.action == DecisionAction::Approved).count();
    let rejected = decisions.len() - approved;
    let chain_len = chain.len();

    match chain.rule() {
        EvaluationRule::Sequential => {
            if rejected > 0 {
                Some(ExpenseStatus::Rejected)
            } else if approved == chain_len {
                Some(ExpenseStatus::Approved)
            } else {
                None
            }
        }
        EvaluationRule::Parallel { min_approval_percentage, rejection_mode } => {
            if rejection_mode == RejectionMode::Immediate && rejected > 0 {
                return Some(ExpenseStatus::Rejected);
            }

            let threshold = usize::from(min_approval_percentage);
            if approved * 100 >= threshold * chain_len {
                return Some(ExpenseStatus::Approved);
            }

            let undecided = chain_len - decisions.len();
            if (approved + undecided) * 100 < threshold * chain_len {
                // Even unanimous approval from everyone outstanding cannot
                // reach the threshold.
                return Some(ExpenseStatus::Rejected);
            }

            None
        }
    }
}

fn join_ids(ids: &[UserId]) -> String {
    ids.iter().map(|id| id.0.as_str()).collect::<Vec<_>>().join(",")
}
