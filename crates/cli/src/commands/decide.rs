use crate::commands::{runtime, CommandResult};
use expenseflow_core::domain::decision::DecisionAction;
use expenseflow_core::domain::expense::{ExpenseId, ExpenseStatus};
use expenseflow_core::domain::user::UserId;
use expenseflow_db::ApprovalService;

pub fn run(
    expense_id: &str,
    approver: &str,
    action: DecisionAction,
    comment: Option<String>,
) -> CommandResult {
    let config = match runtime::load_config("decide") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let rt = match runtime::build_runtime("decide") {
        Ok(rt) => rt,
        Err(failure) => return failure,
    };

    let result = rt.block_on(async {
        let pool = runtime::connect_and_migrate(&config).await?;
        let service = ApprovalService::new(pool.clone());

        let outcome = service
            .record_decision(
                &ExpenseId(expense_id.to_string()),
                &UserId(approver.to_string()),
                action,
                comment,
            )
            .await
            .map_err(|error| ("decision_rejected", error.to_string(), 6u8))?;

        pool.close().await;
        Ok::<_, runtime::CommandFailure>(outcome)
    });

    match result {
        Ok(outcome) => {
            let message = match outcome.status {
                ExpenseStatus::Submitted => {
                    let next = outcome
                        .next_approvers
                        .iter()
                        .map(|id| id.0.as_str())
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!("decision recorded; awaiting: {next}")
                }
                terminal => format!("decision recorded; expense is now {}", terminal.as_str()),
            };
            CommandResult::success("decide", message)
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("decide", error_class, message, exit_code)
        }
    }
}
