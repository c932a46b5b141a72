//! Recomputes the dropout-risk fields of every student that has attendance.
//!
//! Shares `attendance.toml` and `DATABASE_URL` with the server. Progress is
//! logged to stdout; on failure the error chain goes to stderr and the exit
//! code is 1.

use std::process::ExitCode;

use anyhow::{Context, Result};
use smart_attendance::config::AppConfig;
use smart_attendance::database::Database;
use smart_attendance::logging;
use smart_attendance::scoring::{self, DropoutModel};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let config = AppConfig::load()?;
    logging::init_stdout()?;

    let training = &config.predictions.training_data;
    let model = DropoutModel::train_from_csv(training)
        .with_context(|| format!("training dropout model from {}", training.display()))?;

    let db = Database::connect(&config.database.url)
        .await
        .with_context(|| format!("connecting to {}", config.database.url))?;

    let summary = scoring::score_all(&db, &model).await?;
    tracing::info!(
        schools = summary.schools,
        students = summary.students_updated,
        "dropout predictions updated"
    );
    Ok(())
}
