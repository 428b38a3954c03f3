//! In-memory repository implementations for tests and demos.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use expenseflow_core::domain::expense::{Expense, ExpenseId, ExpenseStatus};
use expenseflow_core::domain::policy::ApprovalPolicy;
use expenseflow_core::domain::user::{User, UserId};

use super::{ExpenseRepository, PolicyRepository, RepositoryError, UserRepository};

#[derive(Clone, Default)]
pub struct InMemoryUserRepository {
    users: Arc<RwLock<HashMap<UserId, User>>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn save(&self, user: User) -> Result<(), RepositoryError> {
        self.users.write().await.insert(user.id.clone(), user);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryPolicyRepository {
    policies: Arc<RwLock<HashMap<UserId, ApprovalPolicy>>>,
}

impl InMemoryPolicyRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PolicyRepository for InMemoryPolicyRepository {
    async fn find_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<ApprovalPolicy>, RepositoryError> {
        Ok(self.policies.read().await.get(user_id).cloned())
    }

    async fn upsert(&self, policy: ApprovalPolicy) -> Result<(), RepositoryError> {
        policy.validate()?;
        self.policies.write().await.insert(policy.owner_user_id.clone(), policy);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryExpenseRepository {
    expenses: Arc<RwLock<HashMap<ExpenseId, Expense>>>,
}

impl InMemoryExpenseRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ExpenseRepository for InMemoryExpenseRepository {
    async fn find_by_id(&self, id: &ExpenseId) -> Result<Option<Expense>, RepositoryError> {
        Ok(self.expenses.read().await.get(id).cloned())
    }

    async fn save(&self, expense: Expense) -> Result<(), RepositoryError> {
        self.expenses.write().await.insert(expense.id.clone(), expense);
        Ok(())
    }

    async fn list_submitted(&self) -> Result<Vec<Expense>, RepositoryError> {
        let mut submitted: Vec<Expense> = self
            .expenses
            .read()
            .await
            .values()
            .filter(|expense| expense.status == ExpenseStatus::Submitted)
            .cloned()
            .collect();
        submitted.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(submitted)
    }
}

#[cfg(test)]
mod tests {
    use expenseflow_core::domain::policy::{ApprovalPolicy, PolicyApprover, PolicyId, RejectionMode};
    use expenseflow_core::domain::user::UserId;

    use super::InMemoryPolicyRepository;
    use crate::repositories::PolicyRepository;

    #[tokio::test]
    async fn upsert_replaces_existing_policy() {
        let repo = InMemoryPolicyRepository::new();
        let owner = UserId("u-dev".to_string());

        let mut policy = ApprovalPolicy {
            id: PolicyId("pol-1".to_string()),
            owner_user_id: owner.clone(),
            name: "default".to_string(),
            is_manager_approver: false,
            override_manager_id: None,
            is_sequential: true,
            min_approval_percentage: None,
            rejection_mode: RejectionMode::Immediate,
            approvers: vec![PolicyApprover {
                approver_id: UserId("u-finance".to_string()),
                order_index: 0,
            }],
        };
        repo.upsert(policy.clone()).await.expect("first upsert");

        policy.is_manager_approver = true;
        repo.upsert(policy.clone()).await.expect("second upsert");

        let found = repo.find_by_user(&owner).await.expect("find").expect("exists");
        assert!(found.is_manager_approver);
    }

    #[tokio::test]
    async fn upsert_rejects_invalid_policy() {
        let repo = InMemoryPolicyRepository::new();
        let policy = ApprovalPolicy {
            id: PolicyId("pol-bad".to_string()),
            owner_user_id: UserId("u-dev".to_string()),
            name: "broken".to_string(),
            is_manager_approver: false,
            override_manager_id: None,
            is_sequential: false,
            min_approval_percentage: None,
            rejection_mode: RejectionMode::Immediate,
            approvers: vec![PolicyApprover {
                approver_id: UserId("u-finance".to_string()),
                order_index: 0,
            }],
        };

        assert!(repo.upsert(policy).await.is_err());
    }
}
