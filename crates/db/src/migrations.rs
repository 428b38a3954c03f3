use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::run_pending;
    use crate::connect_with_settings;

    const MANAGED_SCHEMA_OBJECTS: &[&str] = &[
        "users",
        "approval_policy",
        "policy_approver",
        "expense",
        "expense_chain",
        "expense_decision",
        "idx_users_manager_id",
        "idx_policy_approver_policy_id",
        "idx_expense_employee_id",
        "idx_expense_status",
        "idx_expense_chain_approver_id",
        "idx_expense_decision_expense_id",
    ];

    #[tokio::test]
    async fn migrations_create_all_managed_objects() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        for object in MANAGED_SCHEMA_OBJECTS {
            let count = sqlx::query(
                "SELECT COUNT(*) AS count FROM sqlite_master
                 WHERE type IN ('table', 'index') AND name = ?",
            )
            .bind(object)
            .fetch_one(&pool)
            .await
            .expect("query sqlite_master")
            .get::<i64, _>("count");

            assert_eq!(count, 1, "missing schema object `{object}`");
        }
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("first run");
        run_pending(&pool).await.expect("second run is a no-op");
    }

    #[tokio::test]
    async fn one_policy_per_user_is_enforced_by_schema() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrations");

        sqlx::query(
            "INSERT INTO users (id, name, email, role, manager_id, company_id)
             VALUES ('u-1', 'Ana', 'ana@example.com', 'employee', NULL, 'co-1')",
        )
        .execute(&pool)
        .await
        .expect("insert user");

        let insert_policy = |id: &'static str| {
            let pool = pool.clone();
            async move {
                sqlx::query(
                    "INSERT INTO approval_policy
                         (id, user_id, name, is_manager_approver, is_sequential,
                          min_approval_percentage, rejection_mode, created_at, updated_at)
                     VALUES (?, 'u-1', 'default', 1, 1, NULL, 'immediate',
                             '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
                )
                .bind(id)
                .execute(&pool)
                .await
            }
        };

        insert_policy("pol-1").await.expect("first policy");
        insert_policy("pol-2").await.expect_err("second policy for same user must violate UNIQUE");
    }
}
