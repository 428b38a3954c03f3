use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;

use expenseflow_core::domain::decision::{
    ApprovalDecision, DecisionAction, DecisionId,
};
use expenseflow_core::domain::expense::{Expense, ExpenseId, ExpenseStatus};
use expenseflow_core::domain::policy::RejectionMode;
use expenseflow_core::domain::user::UserId;
use expenseflow_core::engine::chain::{ApproverChain, EvaluationRule};

use super::{ExpenseRepository, RepositoryError};
use crate::DbPool;

pub struct SqlExpenseRepository {
    pool: DbPool,
}

impl SqlExpenseRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode_err(error: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

fn parse_decimal(raw: &str) -> Result<Decimal, RepositoryError> {
    raw.parse::<Decimal>().map_err(decode_err)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)).map_err(decode_err)
}

fn row_to_expense_header(row: &SqliteRow) -> Result<Expense, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_err)?;
    let employee_id: String = row.try_get("employee_id").map_err(decode_err)?;
    let category: String = row.try_get("category").map_err(decode_err)?;
    let description: String = row.try_get("description").map_err(decode_err)?;
    let amount: String = row.try_get("amount").map_err(decode_err)?;
    let currency_code: String = row.try_get("currency_code").map_err(decode_err)?;
    let amount_in_company_currency: String =
        row.try_get("amount_in_company_currency").map_err(decode_err)?;
    let expense_date: String = row.try_get("expense_date").map_err(decode_err)?;
    let status: String = row.try_get("status").map_err(decode_err)?;
    let created_at: String = row.try_get("created_at").map_err(decode_err)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode_err)?;

    Ok(Expense {
        id: ExpenseId(id),
        employee_id: UserId(employee_id),
        category,
        description,
        amount: parse_decimal(&amount)?,
        currency_code,
        amount_in_company_currency: parse_decimal(&amount_in_company_currency)?,
        expense_date: NaiveDate::parse_from_str(&expense_date, "%Y-%m-%d")
            .map_err(decode_err)?,
        status: status.parse::<ExpenseStatus>().map_err(RepositoryError::Decode)?,
        chain: None,
        decisions: Vec::new(),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

async fn load_chain(
    conn: &mut SqliteConnection,
    expense_id: &ExpenseId,
) -> Result<Option<ApproverChain>, RepositoryError> {
    let rows = sqlx::query(
        "SELECT position, approver_id, is_sequential, min_approval_percentage, rejection_mode
         FROM expense_chain WHERE expense_id = ? ORDER BY position ASC",
    )
    .bind(&expense_id.0)
    .fetch_all(&mut *conn)
    .await?;

    let Some(first) = rows.first() else {
        return Ok(None);
    };

    let is_sequential: bool = first.try_get("is_sequential").map_err(decode_err)?;
    let rule = if is_sequential {
        EvaluationRule::Sequential
    } else {
        let pct: Option<i64> = first.try_get("min_approval_percentage").map_err(decode_err)?;
        let pct = pct.ok_or_else(|| {
            RepositoryError::Decode(format!(
                "parallel chain for expense `{}` has no threshold",
                expense_id.0
            ))
        })?;
        let mode: String = first.try_get("rejection_mode").map_err(decode_err)?;
        EvaluationRule::Parallel {
            min_approval_percentage: u8::try_from(pct).map_err(decode_err)?,
            rejection_mode: mode.parse::<RejectionMode>().map_err(RepositoryError::Decode)?,
        }
    };

    let mut members = Vec::with_capacity(rows.len());
    for row in &rows {
        let approver_id: String = row.try_get("approver_id").map_err(decode_err)?;
        members.push(UserId(approver_id));
    }

    Ok(Some(ApproverChain::new(members, rule)))
}

async fn load_decisions(
    conn: &mut SqliteConnection,
    expense_id: &ExpenseId,
) -> Result<Vec<ApprovalDecision>, RepositoryError> {
    let rows = sqlx::query(
        "SELECT id, approver_id, action, comment, chain_position, decided_at
         FROM expense_decision WHERE expense_id = ? ORDER BY decided_at ASC, id ASC",
    )
    .bind(&expense_id.0)
    .fetch_all(&mut *conn)
    .await?;

    let mut decisions = Vec::with_capacity(rows.len());
    for row in &rows {
        let id: String = row.try_get("id").map_err(decode_err)?;
        let approver_id: String = row.try_get("approver_id").map_err(decode_err)?;
        let action: String = row.try_get("action").map_err(decode_err)?;
        let comment: Option<String> = row.try_get("comment").map_err(decode_err)?;
        let chain_position: i64 = row.try_get("chain_position").map_err(decode_err)?;
        let decided_at: String = row.try_get("decided_at").map_err(decode_err)?;

        decisions.push(ApprovalDecision {
            id: DecisionId(id),
            approver_id: UserId(approver_id),
            action: action.parse::<DecisionAction>().map_err(RepositoryError::Decode)?,
            comment,
            chain_position: usize::try_from(chain_position).map_err(decode_err)?,
            decided_at: parse_timestamp(&decided_at)?,
        });
    }

    Ok(decisions)
}

/// Loads the full expense aggregate: header, chain snapshot, decision log.
pub(crate) async fn load_expense(
    conn: &mut SqliteConnection,
    id: &ExpenseId,
) -> Result<Option<Expense>, RepositoryError> {
    let row = sqlx::query(
        "SELECT id, employee_id, category, description, amount, currency_code,
                amount_in_company_currency, expense_date, status, created_at, updated_at
         FROM expense WHERE id = ?",
    )
    .bind(&id.0)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mut expense = row_to_expense_header(&row)?;
    expense.chain = load_chain(conn, id).await?;
    expense.decisions = load_decisions(conn, id).await?;
    Ok(Some(expense))
}

pub(crate) async fn store_expense_header(
    conn: &mut SqliteConnection,
    expense: &Expense,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO expense
             (id, employee_id, category, description, amount, currency_code,
              amount_in_company_currency, expense_date, status, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
             category = excluded.category,
             description = excluded.description,
             amount = excluded.amount,
             currency_code = excluded.currency_code,
             amount_in_company_currency = excluded.amount_in_company_currency,
             expense_date = excluded.expense_date,
             status = excluded.status,
             updated_at = excluded.updated_at",
    )
    .bind(&expense.id.0)
    .bind(&expense.employee_id.0)
    .bind(&expense.category)
    .bind(&expense.description)
    .bind(expense.amount.to_string())
    .bind(&expense.currency_code)
    .bind(expense.amount_in_company_currency.to_string())
    .bind(expense.expense_date.format("%Y-%m-%d").to_string())
    .bind(expense.status.as_str())
    .bind(expense.created_at.to_rfc3339())
    .bind(expense.updated_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Persists the submit transition: status flip plus the chain snapshot.
/// The snapshot rows are written once and never touched again.
pub(crate) async fn store_submission(
    conn: &mut SqliteConnection,
    expense: &Expense,
) -> Result<(), RepositoryError> {
    store_expense_header(conn, expense).await?;

    let Some(chain) = &expense.chain else {
        return Ok(());
    };

    let (is_sequential, pct, mode) = match chain.rule() {
        EvaluationRule::Sequential => (true, None, RejectionMode::Immediate),
        EvaluationRule::Parallel { min_approval_percentage, rejection_mode } => {
            (false, Some(i64::from(min_approval_percentage)), rejection_mode)
        }
    };

    for (position, approver_id) in chain.members().iter().enumerate() {
        sqlx::query(
            "INSERT INTO expense_chain
                 (expense_id, position, approver_id, is_sequential,
                  min_approval_percentage, rejection_mode)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&expense.id.0)
        .bind(position as i64)
        .bind(&approver_id.0)
        .bind(is_sequential)
        .bind(pct)
        .bind(mode.as_str())
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

pub(crate) async fn append_decision(
    conn: &mut SqliteConnection,
    expense_id: &ExpenseId,
    decision: &ApprovalDecision,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO expense_decision
             (id, expense_id, approver_id, action, comment, chain_position, decided_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&decision.id.0)
    .bind(&expense_id.0)
    .bind(&decision.approver_id.0)
    .bind(decision.action.as_str())
    .bind(decision.comment.as_deref())
    .bind(decision.chain_position as i64)
    .bind(decision.decided_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub(crate) async fn update_status(
    conn: &mut SqliteConnection,
    expense_id: &ExpenseId,
    status: ExpenseStatus,
    updated_at: DateTime<Utc>,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE expense SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(updated_at.to_rfc3339())
        .bind(&expense_id.0)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

#[async_trait::async_trait]
impl ExpenseRepository for SqlExpenseRepository {
    async fn find_by_id(&self, id: &ExpenseId) -> Result<Option<Expense>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        load_expense(&mut conn, id).await
    }

    async fn save(&self, expense: Expense) -> Result<(), RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        store_expense_header(&mut conn, &expense).await
    }

    async fn list_submitted(&self) -> Result<Vec<Expense>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query("SELECT id FROM expense WHERE status = 'submitted' ORDER BY id")
            .fetch_all(&mut *conn)
            .await?;

        let mut expenses = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.try_get("id").map_err(decode_err)?;
            if let Some(expense) = load_expense(&mut conn, &ExpenseId(id)).await? {
                expenses.push(expense);
            }
        }
        Ok(expenses)
    }
}
