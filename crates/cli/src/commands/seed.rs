use telassist_db::{SupportSeedDataset, TableSeedInfo};

use crate::commands::{open_database, prepare, CommandResult, StepError};

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("seed") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;

        let run_result = async {
            let seeded = SupportSeedDataset::load(&pool)
                .await
                .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
            let verification = SupportSeedDataset::verify(&pool)
                .await
                .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

            if !verification.all_present {
                let failed = verification
                    .checks
                    .iter()
                    .filter_map(|(check, passed)| (!passed).then_some(*check))
                    .collect::<Vec<_>>();
                return Err(("seed_verification", verification_message(&failed), 6u8));
            }
            Ok::<Vec<TableSeedInfo>, StepError>(seeded.tables)
        }
        .await;

        pool.close().await;
        run_result
    });

    match result {
        Ok(tables) => CommandResult::success("seed", seed_summary(&tables)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn seed_summary(tables: &[TableSeedInfo]) -> String {
    let lines = tables
        .iter()
        .map(|table| format!("  - {}: {} rows", table.table, table.rows))
        .collect::<Vec<_>>();
    format!("support seed dataset loaded:\n{}", lines.join("\n"))
}

fn verification_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}
