use std::{future::Future, time::Instant};

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::{
    domain::steps::DeployStep,
    errors::{DeployError, DeployWarning},
};

pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

/// Runs one step, logging its outcome and duration.
pub async fn step_logging<F>(step: DeployStep, run: F) -> Result<Vec<DeployWarning>, DeployError>
where
    F: Future<Output = Result<Vec<DeployWarning>, DeployError>>,
{
    info!(step = %step, "{}", step.description());
    let started_at = Instant::now();

    let outcome = run.await;
    let elapsed_ms = started_at.elapsed().as_millis();

    match &outcome {
        Ok(warnings) => {
            for warning in warnings {
                warn!(step = %step, "{warning}");
            }
            info!(
                step = %step,
                warnings = warnings.len(),
                duration_ms = elapsed_ms,
                "step summary"
            );
        }
        Err(err) => {
            error!(step = %step, duration_ms = elapsed_ms, error = %err, "step failed");
        }
    }

    outcome
}
