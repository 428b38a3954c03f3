use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::decision::ApprovalDecision;
use crate::domain::user::UserId;
use crate::engine::chain::ApproverChain;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpenseId(pub String);

impl std::fmt::Display for ExpenseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpenseStatus {
    Draft,
    Submitted,
    Approved,
    Rejected,
}

impl ExpenseStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for ExpenseStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "submitted" => Ok(Self::Submitted),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!(
                "unknown expense status `{other}` (expected draft|submitted|approved|rejected)"
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub employee_id: UserId,
    pub category: String,
    pub description: String,
    pub amount: Decimal,
    pub currency_code: String,
    /// Converted upstream by the currency collaborator; carried through for
    /// reporting only and never consulted by the engine.
    pub amount_in_company_currency: Decimal,
    pub expense_date: NaiveDate,
    pub status: ExpenseStatus,
    pub chain: Option<ApproverChain>,
    pub decisions: Vec<ApprovalDecision>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Expense {
    /// Forward-only lifecycle: Draft -> Submitted -> Approved | Rejected.
    /// Terminal states accept nothing and Submitted cannot be skipped.
    pub fn can_transition_to(&self, next: ExpenseStatus) -> bool {
        matches!(
            (self.status, next),
            (ExpenseStatus::Draft, ExpenseStatus::Submitted)
                | (ExpenseStatus::Submitted, ExpenseStatus::Approved)
                | (ExpenseStatus::Submitted, ExpenseStatus::Rejected)
        )
    }

    pub fn transition_to(&mut self, next: ExpenseStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidExpenseTransition { from: self.status, to: next })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use super::{Expense, ExpenseId, ExpenseStatus};
    use crate::domain::user::UserId;
    use crate::errors::DomainError;

    fn expense(status: ExpenseStatus) -> Expense {
        Expense {
            id: ExpenseId("EXP-1".to_string()),
            employee_id: UserId("u-emp".to_string()),
            category: "travel".to_string(),
            description: "client visit".to_string(),
            amount: Decimal::new(12_050, 2),
            currency_code: "EUR".to_string(),
            amount_in_company_currency: Decimal::new(13_000, 2),
            expense_date: NaiveDate::from_ymd_opt(2026, 3, 14).expect("valid date"),
            status,
            chain: None,
            decisions: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn draft_submits_forward() {
        let mut expense = expense(ExpenseStatus::Draft);
        expense.transition_to(ExpenseStatus::Submitted).expect("draft -> submitted");
        assert_eq!(expense.status, ExpenseStatus::Submitted);
    }

    #[test]
    fn draft_cannot_skip_submission() {
        let mut expense = expense(ExpenseStatus::Draft);
        let error =
            expense.transition_to(ExpenseStatus::Approved).expect_err("draft -> approved fails");
        assert!(matches!(error, DomainError::InvalidExpenseTransition { .. }));
    }

    #[test]
    fn terminal_states_accept_no_transition() {
        for terminal in [ExpenseStatus::Approved, ExpenseStatus::Rejected] {
            let mut expense = expense(terminal);
            for next in [
                ExpenseStatus::Draft,
                ExpenseStatus::Submitted,
                ExpenseStatus::Approved,
                ExpenseStatus::Rejected,
            ] {
                assert!(expense.transition_to(next).is_err(), "{terminal:?} -> {next:?}");
            }
        }
    }

    #[test]
    fn no_backward_transition_from_submitted() {
        let mut expense = expense(ExpenseStatus::Submitted);
        assert!(expense.transition_to(ExpenseStatus::Draft).is_err());
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            ExpenseStatus::Draft,
            ExpenseStatus::Submitted,
            ExpenseStatus::Approved,
            ExpenseStatus::Rejected,
        ] {
            assert_eq!(status.as_str().parse::<ExpenseStatus>(), Ok(status));
        }
    }
}
