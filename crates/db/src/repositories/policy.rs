use chrono::Utc;
use sqlx::sqlite::SqliteConnection;
use sqlx::Row;

use expenseflow_core::domain::policy::{
    ApprovalPolicy, PolicyApprover, PolicyId, RejectionMode,
};
use expenseflow_core::domain::user::UserId;

use super::{PolicyRepository, RepositoryError};
use crate::DbPool;

pub struct SqlPolicyRepository {
    pool: DbPool,
}

impl SqlPolicyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode<T, E: std::fmt::Display>(result: Result<T, E>) -> Result<T, RepositoryError> {
    result.map_err(|error| RepositoryError::Decode(error.to_string()))
}

/// Loads the one policy bound to `user_id`, approvers in configured order.
/// Shared with the service layer so it can resolve policies inside its
/// per-expense transaction.
pub(crate) async fn load_policy_by_user(
    conn: &mut SqliteConnection,
    user_id: &UserId,
) -> Result<Option<ApprovalPolicy>, RepositoryError> {
    let row = sqlx::query(
        "SELECT id, user_id, name, is_manager_approver, override_manager_id,
                is_sequential, min_approval_percentage, rejection_mode
         FROM approval_policy WHERE user_id = ?",
    )
    .bind(&user_id.0)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let policy_id: String = decode(row.try_get("id"))?;
    let owner: String = decode(row.try_get("user_id"))?;
    let name: String = decode(row.try_get("name"))?;
    let is_manager_approver: bool = decode(row.try_get("is_manager_approver"))?;
    let override_manager_id: Option<String> = decode(row.try_get("override_manager_id"))?;
    let is_sequential: bool = decode(row.try_get("is_sequential"))?;
    let min_approval_percentage: Option<i64> = decode(row.try_get("min_approval_percentage"))?;
    let rejection_mode_raw: String = decode(row.try_get("rejection_mode"))?;

    let approver_rows = sqlx::query(
        "SELECT approver_id, order_index FROM policy_approver
         WHERE policy_id = ? ORDER BY order_index ASC",
    )
    .bind(&policy_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut approvers = Vec::with_capacity(approver_rows.len());
    for approver_row in &approver_rows {
        let approver_id: String = decode(approver_row.try_get("approver_id"))?;
        let order_index: i64 = decode(approver_row.try_get("order_index"))?;
        approvers.push(PolicyApprover {
            approver_id: UserId(approver_id),
            order_index: decode(u32::try_from(order_index))?,
        });
    }

    Ok(Some(ApprovalPolicy {
        id: PolicyId(policy_id),
        owner_user_id: UserId(owner),
        name,
        is_manager_approver,
        override_manager_id: override_manager_id.map(UserId),
        is_sequential,
        min_approval_percentage: match min_approval_percentage {
            Some(value) => Some(decode(u8::try_from(value))?),
            None => None,
        },
        rejection_mode: decode(rejection_mode_raw.parse::<RejectionMode>())?,
        approvers,
    }))
}

#[async_trait::async_trait]
impl PolicyRepository for SqlPolicyRepository {
    async fn find_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<ApprovalPolicy>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        load_policy_by_user(&mut conn, user_id).await
    }

    async fn upsert(&self, policy: ApprovalPolicy) -> Result<(), RepositoryError> {
        policy.validate()?;

        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        // Replace wholesale: one policy per user, and the approver list is
        // easiest kept consistent by rewriting it.
        sqlx::query("DELETE FROM approval_policy WHERE user_id = ?")
            .bind(&policy.owner_user_id.0)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO approval_policy
                 (id, user_id, name, is_manager_approver, override_manager_id,
                  is_sequential, min_approval_percentage, rejection_mode,
                  created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&policy.id.0)
        .bind(&policy.owner_user_id.0)
        .bind(&policy.name)
        .bind(policy.is_manager_approver)
        .bind(policy.override_manager_id.as_ref().map(|id| id.0.clone()))
        .bind(policy.is_sequential)
        .bind(policy.min_approval_percentage.map(i64::from))
        .bind(policy.rejection_mode.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        for approver in &policy.approvers {
            sqlx::query(
                "INSERT INTO policy_approver (policy_id, approver_id, order_index)
                 VALUES (?, ?, ?)",
            )
            .bind(&policy.id.0)
            .bind(&approver.approver_id.0)
            .bind(i64::from(approver.order_index))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
