use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::user::UserId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecisionId(pub String);

impl DecisionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    Approved,
    Rejected,
}

impl DecisionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for DecisionAction {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown decision action `{other}` (expected approved|rejected)")),
        }
    }
}

/// One recorded approver action. Append-only: decisions are never updated
/// or deleted once written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub id: DecisionId,
    pub approver_id: UserId,
    pub action: DecisionAction,
    pub comment: Option<String>,
    pub chain_position: usize,
    pub decided_at: DateTime<Utc>,
}

impl ApprovalDecision {
    pub fn new(
        approver_id: UserId,
        action: DecisionAction,
        comment: Option<String>,
        chain_position: usize,
    ) -> Self {
        Self {
            id: DecisionId::generate(),
            approver_id,
            action,
            comment,
            chain_position,
            decided_at: Utc::now(),
        }
    }
}
