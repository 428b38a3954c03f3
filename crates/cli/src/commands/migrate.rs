use crate::commands::{runtime, CommandResult};
use expenseflow_db::{connect_with_settings, migrations};

pub fn run() -> CommandResult {
    let config = match runtime::load_config("migrate") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let rt = match runtime::build_runtime("migrate") {
        Ok(rt) => rt,
        Err(failure) => return failure,
    };

    let result = rt.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        pool.close().await;
        Ok::<(), runtime::CommandFailure>(())
    });

    match result {
        Ok(()) => CommandResult::success("migrate", "applied pending migrations"),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
    }
}
