use serde::{Deserialize, Serialize};

use crate::domain::policy::{ApprovalPolicy, RejectionMode};
use crate::domain::user::UserId;
use crate::errors::ApprovalError;

/// How a chain's completion is evaluated. Snapshotted with the chain so a
/// policy edit cannot change the rules of an expense already mid-flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum EvaluationRule {
    Sequential,
    Parallel { min_approval_percentage: u8, rejection_mode: RejectionMode },
}

/// The resolved, immutable approver sequence bound to one expense at
/// submission time. Positions are fixed 0..n-1; this order is authoritative
/// for sequential evaluation and is the enumeration order for parallel
/// percentage arithmetic.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproverChain {
    members: Vec<UserId>,
    rule: EvaluationRule,
}

impl ApproverChain {
    pub fn new(members: Vec<UserId>, rule: EvaluationRule) -> Self {
        Self { members, rule }
    }

    pub fn members(&self) -> &[UserId] {
        &self.members
    }

    pub fn rule(&self) -> EvaluationRule {
        self.rule
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn position_of(&self, approver_id: &UserId) -> Option<usize> {
        self.members.iter().position(|member| member == approver_id)
    }
}

pub struct ApproverChainBuilder;

impl ApproverChainBuilder {
    /// Expands a policy into the chain for one expense.
    ///
    /// The manager step comes first: an explicit override always wins, else
    /// the submitter's actual manager when the policy asks for one (skipped
    /// when the submitter has none). Static approvers follow in configured
    /// order, de-duplicated by identity, so an approver who is also the
    /// manager keeps the manager position.
    pub fn build(
        policy: &ApprovalPolicy,
        submitter_manager_id: Option<&UserId>,
    ) -> Result<ApproverChain, ApprovalError> {
        policy.validate()?;

        let mut members: Vec<UserId> = Vec::with_capacity(policy.approvers.len() + 1);

        let manager_step = match (&policy.override_manager_id, policy.is_manager_approver) {
            (Some(override_id), _) => Some(override_id),
            (None, true) => submitter_manager_id,
            (None, false) => None,
        };
        if let Some(manager_id) = manager_step {
            members.push(manager_id.clone());
        }

        for approver in policy.ordered_approvers() {
            if !members.contains(&approver.approver_id) {
                members.push(approver.approver_id.clone());
            }
        }

        if members.is_empty() {
            return Err(ApprovalError::EmptyApproverChain { policy_id: policy.id.clone() });
        }

        let rule = if policy.is_sequential {
            EvaluationRule::Sequential
        } else {
            // validate() guarantees the threshold is present for parallel
            // policies.
            let min_approval_percentage = policy.min_approval_percentage.ok_or_else(|| {
                ApprovalError::InvalidPolicy {
                    policy_id: policy.id.clone(),
                    reason: "parallel policy requires min_approval_percentage".to_string(),
                }
            })?;
            EvaluationRule::Parallel {
                min_approval_percentage,
                rejection_mode: policy.rejection_mode,
            }
        };

        Ok(ApproverChain::new(members, rule))
    }
}
