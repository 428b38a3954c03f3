use async_trait::async_trait;
use thiserror::Error;

use expenseflow_core::domain::expense::{Expense, ExpenseId};
use expenseflow_core::domain::policy::ApprovalPolicy;
use expenseflow_core::domain::user::{User, UserId};
use expenseflow_core::errors::ApprovalError;

pub mod expense;
pub mod memory;
pub mod policy;
pub mod user;

pub use expense::SqlExpenseRepository;
pub use memory::{InMemoryExpenseRepository, InMemoryPolicyRepository, InMemoryUserRepository};
pub use policy::SqlPolicyRepository;
pub use user::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error(transparent)]
    Invalid(#[from] ApprovalError),
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
    async fn save(&self, user: User) -> Result<(), RepositoryError>;
}

/// Keyed user -> policy mapping; `upsert` validates and replaces any policy
/// previously bound to the same user.
#[async_trait]
pub trait PolicyRepository: Send + Sync {
    async fn find_by_user(&self, user_id: &UserId)
        -> Result<Option<ApprovalPolicy>, RepositoryError>;
    async fn upsert(&self, policy: ApprovalPolicy) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ExpenseRepository: Send + Sync {
    async fn find_by_id(&self, id: &ExpenseId) -> Result<Option<Expense>, RepositoryError>;
    async fn save(&self, expense: Expense) -> Result<(), RepositoryError>;
    async fn list_submitted(&self) -> Result<Vec<Expense>, RepositoryError>;
}
