use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::domain::user::UserId;
use crate::errors::ApprovalError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyId(pub String);

impl std::fmt::Display for PolicyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a rejection does while a parallel vote is still open.
///
/// `Immediate` treats every chain member as a gate: one rejection resolves
/// the expense. `Tally` lets the vote continue and only resolves Rejected
/// once the approval threshold is mathematically out of reach.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionMode {
    #[default]
    Immediate,
    Tally,
}

impl RejectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Tally => "tally",
        }
    }
}

impl std::str::FromStr for RejectionMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "immediate" => Ok(Self::Immediate),
            "tally" => Ok(Self::Tally),
            other => Err(format!("unknown rejection mode `{other}` (expected immediate|tally)")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyApprover {
    pub approver_id: UserId,
    pub order_index: u32,
}

/// Per-user approval configuration. Exactly one policy governs a given
/// submitter; the storage layer enforces that uniqueness at write time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalPolicy {
    pub id: PolicyId,
    pub owner_user_id: UserId,
    pub name: String,
    pub is_manager_approver: bool,
    pub override_manager_id: Option<UserId>,
    pub is_sequential: bool,
    pub min_approval_percentage: Option<u8>,
    pub rejection_mode: RejectionMode,
    pub approvers: Vec<PolicyApprover>,
}

impl ApprovalPolicy {
    /// Checks the structural invariants the engine relies on. Storage runs
    /// this before every write; the engine runs it again on read and fails
    /// with `InvalidPolicy` rather than guessing at broken data.
    pub fn validate(&self) -> Result<(), ApprovalError> {
        if !self.is_sequential {
            match self.min_approval_percentage {
                Some(pct) if (1..=100).contains(&pct) => {}
                Some(pct) => {
                    return Err(ApprovalError::InvalidPolicy {
                        policy_id: self.id.clone(),
                        reason: format!(
                            "min_approval_percentage must be in 1..=100, got {pct}"
                        ),
                    });
                }
                None => {
                    return Err(ApprovalError::InvalidPolicy {
                        policy_id: self.id.clone(),
                        reason: "parallel policy requires min_approval_percentage".to_string(),
                    });
                }
            }
        }

        let mut seen_approvers = HashSet::new();
        let mut seen_orders = HashSet::new();
        for approver in &self.approvers {
            if !seen_approvers.insert(&approver.approver_id) {
                return Err(ApprovalError::InvalidPolicy {
                    policy_id: self.id.clone(),
                    reason: format!("duplicate approver `{}`", approver.approver_id.0),
                });
            }
            if !seen_orders.insert(approver.order_index) {
                return Err(ApprovalError::InvalidPolicy {
                    policy_id: self.id.clone(),
                    reason: format!("duplicate order index {}", approver.order_index),
                });
            }
        }

        Ok(())
    }

    /// Static approvers sorted by their configured order.
    pub fn ordered_approvers(&self) -> Vec<&PolicyApprover> {
        let mut approvers: Vec<&PolicyApprover> = self.approvers.iter().collect();
        approvers.sort_by_key(|approver| approver.order_index);
        approvers
    }
}

#[cfg(test)]
mod tests {
    use super::{ApprovalPolicy, PolicyApprover, PolicyId, RejectionMode};
    use crate::domain::user::UserId;
    use crate::errors::ApprovalError;

    fn parallel_policy(pct: Option<u8>) -> ApprovalPolicy {
        ApprovalPolicy {
            id: PolicyId("pol-1".to_string()),
            owner_user_id: UserId("u-emp".to_string()),
            name: "default".to_string(),
            is_manager_approver: false,
            override_manager_id: None,
            is_sequential: false,
            min_approval_percentage: pct,
            rejection_mode: RejectionMode::default(),
            approvers: vec![
                PolicyApprover { approver_id: UserId("u-a".to_string()), order_index: 1 },
                PolicyApprover { approver_id: UserId("u-b".to_string()), order_index: 2 },
            ],
        }
    }

    #[test]
    fn valid_parallel_policy_passes() {
        parallel_policy(Some(50)).validate().expect("valid policy");
    }

    #[test]
    fn parallel_policy_requires_threshold() {
        let error = parallel_policy(None).validate().expect_err("missing threshold");
        assert!(matches!(error, ApprovalError::InvalidPolicy { .. }));
    }

    #[test]
    fn zero_threshold_is_rejected() {
        assert!(parallel_policy(Some(0)).validate().is_err());
    }

    #[test]
    fn sequential_policy_ignores_threshold() {
        let mut policy = parallel_policy(None);
        policy.is_sequential = true;
        policy.validate().expect("sequential policies need no threshold");
    }

    #[test]
    fn duplicate_approver_is_rejected() {
        let mut policy = parallel_policy(Some(50));
        policy.approvers.push(PolicyApprover {
            approver_id: UserId("u-a".to_string()),
            order_index: 3,
        });
        let error = policy.validate().expect_err("duplicate approver");
        assert!(matches!(error, ApprovalError::InvalidPolicy { .. }));
    }

    #[test]
    fn duplicate_order_index_is_rejected() {
        let mut policy = parallel_policy(Some(50));
        policy.approvers.push(PolicyApprover {
            approver_id: UserId("u-c".to_string()),
            order_index: 2,
        });
        assert!(policy.validate().is_err());
    }

    #[test]
    fn ordered_approvers_sorts_by_order_index() {
        let mut policy = parallel_policy(Some(50));
        policy.approvers.reverse();
        let ordered: Vec<&str> = policy
            .ordered_approvers()
            .iter()
            .map(|approver| approver.approver_id.0.as_str())
            .collect();
        assert_eq!(ordered, vec!["u-a", "u-b"]);
    }
}
