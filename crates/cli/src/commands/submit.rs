use crate::commands::{runtime, CommandResult};
use expenseflow_core::domain::expense::ExpenseId;
use expenseflow_core::domain::user::UserId;
use expenseflow_db::ApprovalService;

pub fn run(expense_id: &str, actor: &str) -> CommandResult {
    let config = match runtime::load_config("submit") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let rt = match runtime::build_runtime("submit") {
        Ok(rt) => rt,
        Err(failure) => return failure,
    };

    let result = rt.block_on(async {
        let pool = runtime::connect_and_migrate(&config).await?;
        let service = ApprovalService::new(pool.clone());

        let outcome = service
            .submit_expense(
                &ExpenseId(expense_id.to_string()),
                &UserId(actor.to_string()),
            )
            .await
            .map_err(|error| ("submit_rejected", error.to_string(), 6u8))?;

        pool.close().await;
        Ok::<_, runtime::CommandFailure>(outcome)
    });

    match result {
        Ok(outcome) => {
            let next = outcome
                .next_approvers
                .iter()
                .map(|id| id.0.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            CommandResult::success(
                "submit",
                format!("expense {expense_id} submitted; awaiting: {next}"),
            )
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("submit", error_class, message, exit_code)
        }
    }
}
