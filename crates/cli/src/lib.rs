pub mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::process::ExitCode;

use expenseflow_core::config::{AppConfig, LoadOptions, LogFormat};
use expenseflow_core::domain::decision::DecisionAction;

#[derive(Debug, Parser)]
#[command(
    name = "expenseflow",
    about = "ExpenseFlow approval workflow CLI",
    long_about = "Operate the expense approval workflow: migrations, demo data, \
                  submissions, decisions, and approver queues.",
    after_help = "Examples:\n  expenseflow migrate\n  expenseflow seed\n  expenseflow submit exp-demo-001 --actor u-dev\n  expenseflow decide exp-demo-001 --approver u-finance approve\n  expenseflow pending u-finance"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DecideAction {
    Approve,
    Reject,
}

impl From<DecideAction> for DecisionAction {
    fn from(action: DecideAction) -> Self {
        match action {
            DecideAction::Approve => DecisionAction::Approved,
            DecideAction::Reject => DecisionAction::Rejected,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo dataset (users, policies, draft expenses)")]
    Seed,
    #[command(about = "Submit a draft expense for approval")]
    Submit {
        #[arg(help = "Expense id to submit")]
        expense_id: String,
        #[arg(long, help = "User id performing the submission")]
        actor: String,
    },
    #[command(about = "Record an approve or reject decision on a submitted expense")]
    Decide {
        #[arg(help = "Expense id to decide on")]
        expense_id: String,
        #[arg(long, help = "Approver user id")]
        approver: String,
        #[arg(value_enum, help = "Decision to record")]
        action: DecideAction,
        #[arg(long, help = "Optional decision comment")]
        comment: Option<String>,
    },
    #[command(about = "List submitted expenses the given approver can act on right now")]
    Pending {
        #[arg(help = "Approver user id")]
        approver: String,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate configuration and database connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    let builder = tracing_subscriber::fmt().with_target(false).with_max_level(log_level);
    let result = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    // A second init in the same process is fine; keep the first subscriber.
    let _ = result;
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    if let Ok(config) = AppConfig::load(LoadOptions::default()) {
        init_logging(&config);
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Submit { expense_id, actor } => commands::submit::run(&expense_id, &actor),
        Command::Decide { expense_id, approver, action, comment } => {
            commands::decide::run(&expense_id, &approver, action.into(), comment)
        }
        Command::Pending { approver } => commands::pending::run(&approver),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
