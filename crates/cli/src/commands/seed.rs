use crate::commands::{runtime, CommandResult};
use expenseflow_db::DemoDataset;

pub fn run() -> CommandResult {
    let config = match runtime::load_config("seed") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let rt = match runtime::build_runtime("seed") {
        Ok(rt) => rt,
        Err(failure) => return failure,
    };

    let result = rt.block_on(async {
        let pool = runtime::connect_and_migrate(&config).await?;

        DemoDataset::load(&pool, &config.engine)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let checks = DemoDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let failed: Vec<&str> =
            checks.iter().filter_map(|(label, ok)| (!ok).then_some(*label)).collect();

        let run_result = if failed.is_empty() {
            Ok(checks.len())
        } else {
            Err((
                "seed_verification",
                format!("seed verification failed for checks: {}", failed.join(", ")),
                6u8,
            ))
        };

        pool.close().await;
        run_result
    });

    match result {
        Ok(check_count) => CommandResult::success(
            "seed",
            format!("loaded demo dataset ({check_count} checks passed)"),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}
