pub mod audit;
pub mod config;
pub mod domain;
pub mod engine;
pub mod errors;

pub use audit::{AuditContext, AuditEvent, AuditSink, InMemoryAuditSink};
pub use config::{AppConfig, ConfigError, LoadOptions};
pub use domain::decision::{ApprovalDecision, DecisionAction, DecisionId};
pub use domain::expense::{Expense, ExpenseId, ExpenseStatus};
pub use domain::policy::{ApprovalPolicy, PolicyApprover, PolicyId, RejectionMode};
pub use domain::user::{Role, User, UserId};
pub use engine::chain::{ApproverChain, ApproverChainBuilder, EvaluationRule};
pub use engine::eligibility::{check_eligibility, eligible_set, is_eligible, DecisionValidator};
pub use engine::resolver::{InMemoryPolicyStore, PolicyStore};
pub use engine::state::{ApprovalOutcome, ApprovalStateMachine};
pub use errors::{ApprovalError, DomainError};
