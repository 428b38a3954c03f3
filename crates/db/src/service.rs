//! Approval workflow service: wires the state machine to SQLite storage.
//!
//! Every mutating call runs inside a `BEGIN IMMEDIATE` transaction so that
//! concurrent decisions against the same expense serialize at the database.
//! Eligibility is re-checked inside the transaction against the freshly
//! loaded decision list, which closes the check-then-act race between two
//! approvers racing for the same chain slot.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::sqlite::SqliteConnection;
use tracing::{info, warn};

use expenseflow_core::audit::{AuditContext, AuditSink, InMemoryAuditSink};
use expenseflow_core::domain::decision::DecisionAction;
use expenseflow_core::domain::expense::{Expense, ExpenseId};
use expenseflow_core::domain::user::UserId;
use expenseflow_core::engine::eligibility::DecisionValidator;
use expenseflow_core::engine::state::{ApprovalOutcome, ApprovalStateMachine};
use expenseflow_core::errors::ApprovalError;

use crate::connection::DbPool;
use crate::repositories::{
    expense as expense_sql, policy as policy_sql, user as user_sql, ExpenseRepository,
    RepositoryError, SqlExpenseRepository,
};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Approval(#[from] ApprovalError),
    #[error("expense `{0}` not found")]
    ExpenseNotFound(ExpenseId),
    #[error("user `{0}` not found")]
    UserNotFound(UserId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// One row of an approver's work queue.
#[derive(Clone, Debug, Serialize)]
pub struct PendingApproval {
    pub expense_id: ExpenseId,
    pub employee_id: UserId,
    pub category: String,
    pub description: String,
    pub amount: Decimal,
    pub currency_code: String,
    pub amount_in_company_currency: Decimal,
    pub expense_date: chrono::NaiveDate,
}

impl PendingApproval {
    fn from_expense(expense: &Expense) -> Self {
        Self {
            expense_id: expense.id.clone(),
            employee_id: expense.employee_id.clone(),
            category: expense.category.clone(),
            description: expense.description.clone(),
            amount: expense.amount,
            currency_code: expense.currency_code.clone(),
            amount_in_company_currency: expense.amount_in_company_currency,
            expense_date: expense.expense_date,
        }
    }
}

pub struct ApprovalService {
    pool: DbPool,
    engine: ApprovalStateMachine,
    audit: Arc<dyn AuditSink>,
}

impl ApprovalService {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            engine: ApprovalStateMachine::new(),
            audit: Arc::new(InMemoryAuditSink::default()),
        }
    }

    pub fn with_audit_sink(pool: DbPool, audit: Arc<dyn AuditSink>) -> Self {
        Self { pool, engine: ApprovalStateMachine::new(), audit }
    }

    /// Submits a Draft expense: resolves the owner's policy, snapshots the
    /// approver chain, and flips the status to Submitted.
    pub async fn submit_expense(
        &self,
        expense_id: &ExpenseId,
        actor: &UserId,
    ) -> Result<ApprovalOutcome, ServiceError> {
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        begin_immediate(&mut conn).await?;

        let result = self.submit_in_tx(&mut conn, expense_id, actor).await;
        finish(&mut conn, result).await
    }

    async fn submit_in_tx(
        &self,
        conn: &mut SqliteConnection,
        expense_id: &ExpenseId,
        actor: &UserId,
    ) -> Result<ApprovalOutcome, ServiceError> {
        let mut expense = expense_sql::load_expense(conn, expense_id)
            .await?
            .ok_or_else(|| ServiceError::ExpenseNotFound(expense_id.clone()))?;

        let employee = user_sql::load_user(conn, &expense.employee_id)
            .await?
            .ok_or_else(|| ServiceError::UserNotFound(expense.employee_id.clone()))?;

        let policy = policy_sql::load_policy_by_user(conn, &expense.employee_id)
            .await?
            .ok_or_else(|| ApprovalError::PolicyNotFound {
                user_id: expense.employee_id.clone(),
            })?;

        let audit_ctx =
            AuditContext::new(Some(expense_id.clone()), expense_id.0.clone(), actor.0.clone());
        let outcome = self
            .engine
            .submit_with_audit(
                &mut expense,
                &policy,
                employee.manager_id.as_ref(),
                self.audit.as_ref(),
                &audit_ctx,
            )
            .map_err(|error| {
                warn!(
                    event_name = "approval.submit_rejected",
                    expense_id = %expense_id,
                    error = %error,
                    "submit rejected"
                );
                error
            })?;

        expense_sql::store_submission(conn, &expense).await?;

        info!(
            event_name = "approval.submitted",
            expense_id = %expense_id,
            chain_len = expense.chain.as_ref().map_or(0, |c| c.len()),
            "expense submitted for approval"
        );
        Ok(outcome)
    }

    /// Records one approve/reject decision and applies any resulting
    /// terminal transition.
    pub async fn record_decision(
        &self,
        expense_id: &ExpenseId,
        approver_id: &UserId,
        action: DecisionAction,
        comment: Option<String>,
    ) -> Result<ApprovalOutcome, ServiceError> {
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        begin_immediate(&mut conn).await?;

        let result = self.decide_in_tx(&mut conn, expense_id, approver_id, action, comment).await;
        finish(&mut conn, result).await
    }

    async fn decide_in_tx(
        &self,
        conn: &mut SqliteConnection,
        expense_id: &ExpenseId,
        approver_id: &UserId,
        action: DecisionAction,
        comment: Option<String>,
    ) -> Result<ApprovalOutcome, ServiceError> {
        let mut expense = expense_sql::load_expense(conn, expense_id)
            .await?
            .ok_or_else(|| ServiceError::ExpenseNotFound(expense_id.clone()))?;

        let audit_ctx =
            AuditContext::new(Some(expense_id.clone()), expense_id.0.clone(), approver_id.0.clone());
        let outcome = self
            .engine
            .act_with_audit(
                &mut expense,
                approver_id,
                action,
                comment,
                self.audit.as_ref(),
                &audit_ctx,
            )
            .map_err(|error| {
                warn!(
                    event_name = "approval.decision_rejected",
                    expense_id = %expense_id,
                    approver_id = %approver_id,
                    error = %error,
                    "decision rejected"
                );
                error
            })?;

        let decision = expense.decisions.last().ok_or_else(|| {
            RepositoryError::Decode("decision list empty after recorded action".to_string())
        })?;
        expense_sql::append_decision(conn, expense_id, decision).await?;
        expense_sql::update_status(conn, expense_id, expense.status, expense.updated_at).await?;

        info!(
            event_name = "approval.decision_recorded",
            expense_id = %expense_id,
            approver_id = %approver_id,
            action = action.as_str(),
            status = outcome.status.as_str(),
            "decision recorded"
        );
        Ok(outcome)
    }

    /// Lists the submitted expenses this approver can currently act on.
    pub async fn pending_for_approver(
        &self,
        approver_id: &UserId,
    ) -> Result<Vec<PendingApproval>, ServiceError> {
        let submitted = SqlExpenseRepository::new(self.pool.clone())
            .list_submitted()
            .await?;

        Ok(submitted
            .iter()
            .filter(|expense| DecisionValidator::is_eligible(expense, approver_id))
            .map(PendingApproval::from_expense)
            .collect())
    }
}

async fn begin_immediate(conn: &mut SqliteConnection) -> Result<(), ServiceError> {
    sqlx::query("BEGIN IMMEDIATE")
        .execute(&mut *conn)
        .await
        .map_err(RepositoryError::from)?;
    Ok(())
}

async fn finish<T>(
    conn: &mut SqliteConnection,
    result: Result<T, ServiceError>,
) -> Result<T, ServiceError> {
    match result {
        Ok(value) => {
            sqlx::query("COMMIT").execute(&mut *conn).await.map_err(RepositoryError::from)?;
            Ok(value)
        }
        Err(error) => {
            if let Err(rollback) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                warn!(error = %rollback, "rollback failed");
            }
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use expenseflow_core::domain::decision::DecisionAction;
    use expenseflow_core::domain::expense::{Expense, ExpenseId, ExpenseStatus};
    use expenseflow_core::domain::policy::{
        ApprovalPolicy, PolicyApprover, PolicyId, RejectionMode,
    };
    use expenseflow_core::domain::user::UserId;
    use expenseflow_core::errors::ApprovalError;

    use super::{ApprovalService, ServiceError};
    use crate::repositories::{ExpenseRepository, PolicyRepository, SqlExpenseRepository, SqlPolicyRepository};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> crate::DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        crate::fixtures::seed_users(&pool).await.expect("seed users");
        pool
    }

    fn sequential_policy(owner: &str, approvers: &[&str]) -> ApprovalPolicy {
        ApprovalPolicy {
            id: PolicyId(format!("pol-{owner}")),
            owner_user_id: UserId(owner.to_string()),
            name: "default".to_string(),
            is_manager_approver: false,
            override_manager_id: None,
            is_sequential: true,
            min_approval_percentage: None,
            rejection_mode: RejectionMode::Immediate,
            approvers: approvers
                .iter()
                .enumerate()
                .map(|(i, id)| PolicyApprover {
                    approver_id: UserId(id.to_string()),
                    order_index: i as u32,
                })
                .collect(),
        }
    }

    fn draft(id: &str, employee: &str) -> Expense {
        let now = Utc::now();
        Expense {
            id: ExpenseId(id.to_string()),
            employee_id: UserId(employee.to_string()),
            category: "travel".to_string(),
            description: "airport taxi".to_string(),
            amount: Decimal::new(3_800, 2),
            currency_code: "EUR".to_string(),
            amount_in_company_currency: Decimal::new(3_800, 2),
            expense_date: NaiveDate::from_ymd_opt(2026, 5, 10).expect("valid date"),
            status: ExpenseStatus::Draft,
            chain: None,
            decisions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn submit_then_approve_through_whole_chain() {
        let pool = setup().await;
        let expenses = SqlExpenseRepository::new(pool.clone());
        let policies = SqlPolicyRepository::new(pool.clone());
        let service = ApprovalService::new(pool);

        policies
            .upsert(sequential_policy("u-dev", &["u-finance", "u-cfo"]))
            .await
            .expect("policy");
        expenses.save(draft("exp-1", "u-dev")).await.expect("draft");

        let expense_id = ExpenseId("exp-1".to_string());
        let outcome =
            service.submit_expense(&expense_id, &UserId("u-dev".to_string())).await.expect("submit");
        assert_eq!(outcome.status, ExpenseStatus::Submitted);
        assert_eq!(outcome.next_approvers, vec![UserId("u-finance".to_string())]);

        let outcome = service
            .record_decision(
                &expense_id,
                &UserId("u-finance".to_string()),
                DecisionAction::Approved,
                None,
            )
            .await
            .expect("first decision");
        assert_eq!(outcome.status, ExpenseStatus::Submitted);
        assert_eq!(outcome.next_approvers, vec![UserId("u-cfo".to_string())]);

        let outcome = service
            .record_decision(
                &expense_id,
                &UserId("u-cfo".to_string()),
                DecisionAction::Approved,
                Some("within budget".to_string()),
            )
            .await
            .expect("final decision");
        assert_eq!(outcome.status, ExpenseStatus::Approved);

        let stored = expenses.find_by_id(&expense_id).await.expect("find").expect("exists");
        assert_eq!(stored.status, ExpenseStatus::Approved);
        assert_eq!(stored.decisions.len(), 2);
        assert_eq!(stored.decisions[1].comment.as_deref(), Some("within budget"));
    }

    #[tokio::test]
    async fn submit_without_policy_fails_with_policy_not_found() {
        let pool = setup().await;
        let expenses = SqlExpenseRepository::new(pool.clone());
        let service = ApprovalService::new(pool);

        expenses.save(draft("exp-1", "u-sales")).await.expect("draft");

        let err = service
            .submit_expense(&ExpenseId("exp-1".to_string()), &UserId("u-sales".to_string()))
            .await
            .expect_err("no policy");
        assert!(matches!(
            err,
            ServiceError::Approval(ApprovalError::PolicyNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn chain_snapshot_survives_policy_edits() {
        let pool = setup().await;
        let expenses = SqlExpenseRepository::new(pool.clone());
        let policies = SqlPolicyRepository::new(pool.clone());
        let service = ApprovalService::new(pool);

        policies
            .upsert(sequential_policy("u-dev", &["u-finance", "u-cfo"]))
            .await
            .expect("policy");
        expenses.save(draft("exp-1", "u-dev")).await.expect("draft");

        let expense_id = ExpenseId("exp-1".to_string());
        service
            .submit_expense(&expense_id, &UserId("u-dev".to_string()))
            .await
            .expect("submit");

        // Rewrite the policy out from under the in-flight expense.
        policies
            .upsert(sequential_policy("u-dev", &["u-mgr"]))
            .await
            .expect("policy rewrite");

        let err = service
            .record_decision(
                &expense_id,
                &UserId("u-mgr".to_string()),
                DecisionAction::Approved,
                None,
            )
            .await
            .expect_err("u-mgr is not in the snapshot");
        assert!(matches!(err, ServiceError::Approval(ApprovalError::NotEligible { .. })));

        service
            .record_decision(
                &expense_id,
                &UserId("u-finance".to_string()),
                DecisionAction::Approved,
                None,
            )
            .await
            .expect("snapshot member still decides");
    }

    #[tokio::test]
    async fn rejection_is_terminal() {
        let pool = setup().await;
        let expenses = SqlExpenseRepository::new(pool.clone());
        let policies = SqlPolicyRepository::new(pool.clone());
        let service = ApprovalService::new(pool);

        policies
            .upsert(sequential_policy("u-dev", &["u-finance", "u-cfo"]))
            .await
            .expect("policy");
        expenses.save(draft("exp-1", "u-dev")).await.expect("draft");

        let expense_id = ExpenseId("exp-1".to_string());
        service
            .submit_expense(&expense_id, &UserId("u-dev".to_string()))
            .await
            .expect("submit");

        let outcome = service
            .record_decision(
                &expense_id,
                &UserId("u-finance".to_string()),
                DecisionAction::Rejected,
                Some("missing receipt".to_string()),
            )
            .await
            .expect("rejection");
        assert_eq!(outcome.status, ExpenseStatus::Rejected);

        let err = service
            .record_decision(
                &expense_id,
                &UserId("u-cfo".to_string()),
                DecisionAction::Approved,
                None,
            )
            .await
            .expect_err("terminal expense");
        assert!(matches!(err, ServiceError::Approval(ApprovalError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn pending_queue_tracks_sequential_turn() {
        let pool = setup().await;
        let expenses = SqlExpenseRepository::new(pool.clone());
        let policies = SqlPolicyRepository::new(pool.clone());
        let service = ApprovalService::new(pool);

        policies
            .upsert(sequential_policy("u-dev", &["u-finance", "u-cfo"]))
            .await
            .expect("policy");
        expenses.save(draft("exp-1", "u-dev")).await.expect("draft");

        let expense_id = ExpenseId("exp-1".to_string());
        service
            .submit_expense(&expense_id, &UserId("u-dev".to_string()))
            .await
            .expect("submit");

        let finance = UserId("u-finance".to_string());
        let cfo = UserId("u-cfo".to_string());

        assert_eq!(service.pending_for_approver(&finance).await.expect("queue").len(), 1);
        assert!(service.pending_for_approver(&cfo).await.expect("queue").is_empty());

        service
            .record_decision(&expense_id, &finance, DecisionAction::Approved, None)
            .await
            .expect("decision");

        assert!(service.pending_for_approver(&finance).await.expect("queue").is_empty());
        assert_eq!(service.pending_for_approver(&cfo).await.expect("queue").len(), 1);
    }

    #[tokio::test]
    async fn submitting_twice_fails_with_invalid_state() {
        let pool = setup().await;
        let expenses = SqlExpenseRepository::new(pool.clone());
        let policies = SqlPolicyRepository::new(pool.clone());
        let service = ApprovalService::new(pool);

        policies.upsert(sequential_policy("u-dev", &["u-finance"])).await.expect("policy");
        expenses.save(draft("exp-1", "u-dev")).await.expect("draft");

        let expense_id = ExpenseId("exp-1".to_string());
        let submitter = UserId("u-dev".to_string());
        service.submit_expense(&expense_id, &submitter).await.expect("submit");

        let err = service.submit_expense(&expense_id, &submitter).await.expect_err("resubmit");
        assert!(matches!(err, ServiceError::Approval(ApprovalError::InvalidState { .. })));
    }
}
