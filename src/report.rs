use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{info, warn};

use crate::{
    domain::steps::DeployStep,
    errors::DeployWarning,
    plan::DeploymentPlan,
    systemd_client::UnitStatus,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub step: DeployStep,
    pub skipped: bool,
    pub warnings: usize,
}

#[derive(Debug, Clone)]
pub struct DeploymentReport {
    pub steps: Vec<StepRecord>,
    pub warnings: Vec<DeployWarning>,
    pub services: Vec<UnitStatus>,
    pub finished_at: DateTime<Utc>,
}

impl DeploymentReport {
    pub fn completed_steps(&self) -> impl Iterator<Item = DeployStep> + '_ {
        self.steps
            .iter()
            .filter(|record| !record.skipped)
            .map(|record| record.step)
    }

    pub fn log_summary(&self, plan: &DeploymentPlan) {
        info!(
            finished_at = %self.finished_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            warnings = self.warnings.len(),
            "deployment complete"
        );
        info!(path = %plan.bin_dir.display(), "application installed");
        info!(path = %plan.venv_dir().display(), "python environment");
        info!(path = %plan.config_dir.display(), "configuration");
        info!(path = %plan.data_dir.display(), "data");
        info!(path = %plan.log_dir.display(), "logs");

        for service in &self.services {
            info!(
                unit = %service.name,
                file_state = %service.file_state,
                active_state = %service.active_state,
                "service"
            );
        }

        for warning in &self.warnings {
            warn!("{warning}");
        }
    }
}
