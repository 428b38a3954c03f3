//! Deterministic seed data for tests and the `seed` command.

use sqlx::Executor;

use expenseflow_core::config::EngineConfig;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

struct SeedUser {
    id: &'static str,
    name: &'static str,
    email: &'static str,
    role: &'static str,
    manager_id: Option<&'static str>,
}

const SEED_COMPANY_ID: &str = "acme";

const SEED_USERS: &[SeedUser] = &[
    SeedUser {
        id: "u-cfo",
        name: "Dana Whitfield",
        email: "dana@acme.example",
        role: "admin",
        manager_id: None,
    },
    SeedUser {
        id: "u-mgr",
        name: "Priya Raman",
        email: "priya@acme.example",
        role: "manager",
        manager_id: Some("u-cfo"),
    },
    SeedUser {
        id: "u-finance",
        name: "Jonas Keller",
        email: "jonas@acme.example",
        role: "manager",
        manager_id: Some("u-cfo"),
    },
    SeedUser {
        id: "u-dev",
        name: "Mara Olson",
        email: "mara@acme.example",
        role: "employee",
        manager_id: Some("u-mgr"),
    },
    SeedUser {
        id: "u-sales",
        name: "Theo Brandt",
        email: "theo@acme.example",
        role: "employee",
        manager_id: Some("u-finance"),
    },
];

/// Inserts the canonical user set. Safe to call more than once.
pub async fn seed_users(pool: &DbPool) -> Result<(), RepositoryError> {
    for user in SEED_USERS {
        sqlx::query(
            "INSERT INTO users (id, name, email, role, manager_id, company_id)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 email = excluded.email,
                 role = excluded.role,
                 manager_id = excluded.manager_id",
        )
        .bind(user.id)
        .bind(user.name)
        .bind(user.email)
        .bind(user.role)
        .bind(user.manager_id)
        .bind(SEED_COMPANY_ID)
        .execute(pool)
        .await?;
    }
    Ok(())
}

/// Demo dataset for walking the approval flows end to end: the canonical
/// users, a sequential policy for `u-dev`, a parallel 50% policy for
/// `u-sales`, and one draft expense per employee. Demo policies carry no
/// explicit rejection mode of their own, so they are stamped with
/// `EngineConfig::default_rejection_mode`.
pub struct DemoDataset;

struct SeedPolicy {
    id: &'static str,
    user_id: &'static str,
    name: &'static str,
    is_manager_approver: bool,
    is_sequential: bool,
    min_approval_percentage: Option<i64>,
}

const SEED_POLICIES: &[SeedPolicy] = &[
    SeedPolicy {
        id: "pol-dev",
        user_id: "u-dev",
        name: "engineering default",
        is_manager_approver: true,
        is_sequential: true,
        min_approval_percentage: None,
    },
    SeedPolicy {
        id: "pol-sales",
        user_id: "u-sales",
        name: "sales parallel",
        is_manager_approver: false,
        is_sequential: false,
        min_approval_percentage: Some(50),
    },
];

const DEMO_SQL: &str = r#"
DELETE FROM policy_approver WHERE policy_id IN ('pol-dev', 'pol-sales');
INSERT INTO policy_approver (policy_id, approver_id, order_index) VALUES
    ('pol-dev', 'u-finance', 0),
    ('pol-dev', 'u-cfo', 1),
    ('pol-sales', 'u-mgr', 0),
    ('pol-sales', 'u-finance', 1),
    ('pol-sales', 'u-cfo', 2);

INSERT OR REPLACE INTO expense
    (id, employee_id, category, description, amount, currency_code,
     amount_in_company_currency, expense_date, status, created_at, updated_at)
VALUES
    ('exp-demo-001', 'u-dev', 'travel', 'Conference train ticket', '182.50', 'EUR',
     '182.50', '2026-08-12', 'draft',
     '2026-08-13T09:00:00+00:00', '2026-08-13T09:00:00+00:00'),
    ('exp-demo-002', 'u-sales', 'meals', 'Client dinner', '96.00', 'EUR',
     '96.00', '2026-08-20', 'draft',
     '2026-08-21T08:30:00+00:00', '2026-08-21T08:30:00+00:00');
"#;

const DEMO_EXPENSE_IDS: &[&str] = &["exp-demo-001", "exp-demo-002"];
const DEMO_POLICY_IDS: &[&str] = &["pol-dev", "pol-sales"];

impl DemoDataset {
    pub async fn load(pool: &DbPool, engine: &EngineConfig) -> Result<(), RepositoryError> {
        seed_users(pool).await?;
        let mut tx = pool.begin().await?;

        for policy in SEED_POLICIES {
            sqlx::query(
                "INSERT OR REPLACE INTO approval_policy
                     (id, user_id, name, is_manager_approver, override_manager_id,
                      is_sequential, min_approval_percentage, rejection_mode,
                      created_at, updated_at)
                 VALUES (?, ?, ?, ?, NULL, ?, ?, ?,
                         '2026-08-01T00:00:00+00:00', '2026-08-01T00:00:00+00:00')",
            )
            .bind(policy.id)
            .bind(policy.user_id)
            .bind(policy.name)
            .bind(policy.is_manager_approver)
            .bind(policy.is_sequential)
            .bind(policy.min_approval_percentage)
            .bind(engine.default_rejection_mode.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.execute(sqlx::query(DEMO_SQL)).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Checks that the demo rows exist. Returns one (label, ok) pair per check.
    pub async fn verify(pool: &DbPool) -> Result<Vec<(&'static str, bool)>, RepositoryError> {
        let mut checks = Vec::new();

        let user_count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE company_id = ?")
            .bind(SEED_COMPANY_ID)
            .fetch_one(pool)
            .await?;
        checks.push(("users", user_count >= SEED_USERS.len() as i64));

        for policy_id in DEMO_POLICY_IDS {
            let exists: i64 =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM approval_policy WHERE id = ?)")
                    .bind(policy_id)
                    .fetch_one(pool)
                    .await?;
            checks.push((*policy_id, exists == 1));
        }

        for expense_id in DEMO_EXPENSE_IDS {
            let exists: i64 =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM expense WHERE id = ?)")
                    .bind(expense_id)
                    .fetch_one(pool)
                    .await?;
            checks.push((*expense_id, exists == 1));
        }

        Ok(checks)
    }
}
