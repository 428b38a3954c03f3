pub mod config;
pub mod decide;
pub mod doctor;
pub mod migrate;
pub mod pending;
pub mod seed;
pub mod submit;

use serde::Serialize;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Shared scaffolding for commands that need config, a runtime, and a pool.
pub(crate) mod runtime {
    use expenseflow_core::config::{AppConfig, LoadOptions};
    use expenseflow_db::{connect_with_settings, migrations, DbPool};

    use super::CommandResult;

    pub(crate) type CommandFailure = (&'static str, String, u8);

    pub(crate) fn load_config(command: &str) -> Result<AppConfig, CommandResult> {
        AppConfig::load(LoadOptions::default()).map_err(|error| {
            CommandResult::failure(
                command,
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            )
        })
    }

    pub(crate) fn build_runtime(command: &str) -> Result<tokio::runtime::Runtime, CommandResult> {
        tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
            CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            )
        })
    }

    pub(crate) async fn connect_and_migrate(config: &AppConfig) -> Result<DbPool, CommandFailure> {
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
        Ok(pool)
    }
}
