use crate::commands::{runtime, CommandResult};
use expenseflow_core::domain::user::UserId;
use expenseflow_db::ApprovalService;

pub fn run(approver: &str) -> CommandResult {
    let config = match runtime::load_config("pending") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let rt = match runtime::build_runtime("pending") {
        Ok(rt) => rt,
        Err(failure) => return failure,
    };

    let result = rt.block_on(async {
        let pool = runtime::connect_and_migrate(&config).await?;
        let service = ApprovalService::new(pool.clone());

        let pending = service
            .pending_for_approver(&UserId(approver.to_string()))
            .await
            .map_err(|error| ("queue_lookup", error.to_string(), 6u8))?;

        pool.close().await;
        Ok::<_, runtime::CommandFailure>(pending)
    });

    match result {
        Ok(pending) => {
            let rows = serde_json::to_string(&pending)
                .unwrap_or_else(|error| format!("[\"serialization failed: {error}\"]"));
            CommandResult::success(
                "pending",
                format!("{} expense(s) awaiting {approver}: {rows}", pending.len()),
            )
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("pending", error_class, message, exit_code)
        }
    }
}
