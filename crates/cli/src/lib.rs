pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use telassist_core::Role;

use crate::commands::ask::{AskRequest, DEFAULT_SESSION};

#[derive(Debug, Parser)]
#[command(
    name = "telassist",
    about = "Telecom support assistant operator CLI",
    long_about = "Ask the support router a question, manage the support database, and check runtime readiness.",
    after_help = "Examples:\n  telassist ask \"Why is my bill so high?\" --customer CUST001\n  telassist doctor --json\n  telassist smoke"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Route one support query and print the sanitized answer")]
    Ask {
        #[arg(help = "Query text")]
        text: String,
        #[arg(long, default_value = DEFAULT_SESSION, help = "Conversation session id")]
        session: String,
        #[arg(long, default_value = "customer", help = "Caller role (admin|customer)")]
        role: Role,
        #[arg(long, help = "Customer id used for account lookups")]
        customer: Option<String>,
    },
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic support dataset (plans, customers, incidents, passages)")]
    Seed,
    #[command(about = "Run end-to-end readiness checks with per-check timing details")]
    Smoke,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, model readiness, DB connectivity and routing setup")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Ask { text, session, role, customer } => commands::ask::run(AskRequest {
            session_id: session,
            role,
            customer_id: customer,
            ..AskRequest::new(text)
        }),
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Smoke => commands::smoke::run(),
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
