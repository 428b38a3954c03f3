use std::collections::HashMap;

use crate::domain::policy::ApprovalPolicy;
use crate::domain::user::UserId;
use crate::errors::ApprovalError;

/// Lookup seam for the single policy bound to a submitter. Implementations
/// must behave as a keyed mapping (one policy per user); the resolver never
/// synthesizes a default.
pub trait PolicyStore {
    fn resolve(&self, user_id: &UserId) -> Result<ApprovalPolicy, ApprovalError>;
}

/// Keyed in-memory store, used by tests and small deployments. Inserting a
/// policy for a user replaces any previous one, which is exactly the
/// one-policy-per-user uniqueness rule.
#[derive(Clone, Debug, Default)]
pub struct InMemoryPolicyStore {
    policies: HashMap<UserId, ApprovalPolicy>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&mut self, policy: ApprovalPolicy) -> Result<(), ApprovalError> {
        policy.validate()?;
        self.policies.insert(policy.owner_user_id.clone(), policy);
        Ok(())
    }
}

impl PolicyStore for InMemoryPolicyStore {
    fn resolve(&self, user_id: &UserId) -> Result<ApprovalPolicy, ApprovalError> {
        let policy = self
            .policies
            .get(user_id)
            .cloned()
            .ok_or_else(|| ApprovalError::PolicyNotFound { user_id: user_id.clone() })?;
        policy.validate()?;
        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::{InMemoryPolicyStore, PolicyStore};
    use crate::domain::policy::{ApprovalPolicy, PolicyApprover, PolicyId, RejectionMode};
    use crate::domain::user::UserId;
    use crate::errors::ApprovalError;

    fn uid(raw: &str) -> UserId {
        UserId(raw.to_string())
    }

    fn policy(id: &str, owner: &str) -> ApprovalPolicy {
        ApprovalPolicy {
            id: PolicyId(id.to_string()),
            owner_user_id: uid(owner),
            name: "default".to_string(),
            is_manager_approver: true,
            override_manager_id: None,
            is_sequential: true,
            min_approval_percentage: None,
            rejection_mode: RejectionMode::default(),
            approvers: vec![PolicyApprover { approver_id: uid("u-fin"), order_index: 1 }],
        }
    }

    #[test]
    fn resolve_is_a_total_function_with_not_found() {
        let store = InMemoryPolicyStore::new();
        let error = store.resolve(&uid("u-ghost")).expect_err("no policy bound");
        assert_eq!(error, ApprovalError::PolicyNotFound { user_id: uid("u-ghost") });
    }

    #[test]
    fn upsert_replaces_the_previous_policy_for_a_user() {
        let mut store = InMemoryPolicyStore::new();
        store.upsert(policy("pol-1", "u-emp")).expect("first");
        store.upsert(policy("pol-2", "u-emp")).expect("replacement");

        let resolved = store.resolve(&uid("u-emp")).expect("resolve");
        assert_eq!(resolved.id.0, "pol-2");
    }

    #[test]
    fn invalid_policy_is_rejected_at_write_time() {
        let mut store = InMemoryPolicyStore::new();
        let mut broken = policy("pol-1", "u-emp");
        broken.is_sequential = false;
        broken.min_approval_percentage = None;

        let error = store.upsert(broken).expect_err("invalid policy");
        assert!(matches!(error, ApprovalError::InvalidPolicy { .. }));
    }
}
