use std::{
    path::Path,
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::Utc;
use tracing::info;

pub mod config;
pub mod domain;
pub mod errors;
pub mod host;
pub mod logging;
pub mod plan;
pub mod report;
pub mod systemd_client;

use domain::{files, monitor_config, permissions, steps::DeployStep};
use errors::{DeployError, DeployWarning};
use host::{venv_python, HostOps};
use plan::DeploymentPlan;
use report::{DeploymentReport, StepRecord};
use systemd_client::{ServiceManager, UnitStatus};

pub const VERIFY_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Clone)]
pub struct Deployer {
    host: Arc<dyn HostOps>,
    services: Arc<dyn ServiceManager>,
    verify: bool,
    verify_timeout: Duration,
}

impl Deployer {
    pub fn new(host: Arc<dyn HostOps>, services: Arc<dyn ServiceManager>) -> Self {
        Self {
            host,
            services,
            verify: true,
            verify_timeout: Duration::from_secs(config::DEFAULT_VERIFY_TIMEOUT_SECS),
        }
    }

    pub fn with_verification(mut self, verify: bool, timeout: Duration) -> Self {
        self.verify = verify;
        self.verify_timeout = timeout;
        self
    }

    /// Runs every step in order. The first fatal error stops the deployment and
    /// leaves whatever was already applied in place.
    pub async fn deploy(
        &self,
        plan: &DeploymentPlan,
        source_root: &Path,
    ) -> Result<DeploymentReport, DeployError> {
        plan.validate()?;
        info!(source_root = %source_root.display(), "starting deployment");

        let mut steps = Vec::with_capacity(DeployStep::ALL.len());
        let mut warnings = Vec::new();
        let mut services = Vec::new();

        for step in DeployStep::ALL {
            if step.is_optional() && !self.verify {
                info!(step = %step, "step skipped");
                steps.push(StepRecord {
                    step,
                    skipped: true,
                    warnings: 0,
                });
                continue;
            }

            let step_warnings = logging::step_logging(
                step,
                self.run_step(step, plan, source_root, &mut services),
            )
            .await
            .map_err(|source| DeployError::Step {
                step,
                source: Box::new(source),
            })?;

            steps.push(StepRecord {
                step,
                skipped: false,
                warnings: step_warnings.len(),
            });
            warnings.extend(step_warnings);
        }

        Ok(DeploymentReport {
            steps,
            warnings,
            services,
            finished_at: Utc::now(),
        })
    }

    async fn run_step(
        &self,
        step: DeployStep,
        plan: &DeploymentPlan,
        source_root: &Path,
        services: &mut Vec<UnitStatus>,
    ) -> Result<Vec<DeployWarning>, DeployError> {
        match step {
            DeployStep::EnsureAccount => self.ensure_account(plan).await,
            DeployStep::EnsureDirectories => {
                files::ensure_directories(&plan.directories()).await?;
                Ok(Vec::new())
            }
            DeployStep::InstallApplication => install_application(plan, source_root).await,
            DeployStep::ProvisionEnvironment => self.provision_environment(plan).await,
            DeployStep::InstallConfig => install_config(plan, source_root).await,
            DeployStep::InstallUnits => install_units(plan, source_root).await,
            DeployStep::ApplyOwnership => {
                permissions::apply_ownership(
                    self.host.as_ref(),
                    &plan.ownership_rules(),
                    &plan.service_account,
                )
                .await?;
                Ok(Vec::new())
            }
            DeployStep::ActivateServices => self.activate_services(plan).await,
            DeployStep::VerifyServices => {
                let (statuses, warnings) = self.verify_services(plan).await?;
                *services = statuses;
                Ok(warnings)
            }
        }
    }

    async fn ensure_account(
        &self,
        plan: &DeploymentPlan,
    ) -> Result<Vec<DeployWarning>, DeployError> {
        let account = plan.service_account.as_str();
        if self.host.account_exists(account).await? {
            info!(account, "service account already exists");
        } else {
            self.host.create_system_account(account).await?;
            info!(account, "service account created");
        }
        Ok(Vec::new())
    }

    async fn provision_environment(
        &self,
        plan: &DeploymentPlan,
    ) -> Result<Vec<DeployWarning>, DeployError> {
        let venv_dir = plan.venv_dir();
        if files::is_file(&venv_python(&venv_dir)).await {
            info!(path = %venv_dir.display(), "reusing python environment");
        } else {
            self.host.create_virtualenv(&venv_dir).await?;
            info!(path = %venv_dir.display(), "python environment created");
        }

        self.host
            .install_requirements(&venv_dir, &plan.installed_manifest())
            .await?;
        Ok(Vec::new())
    }

    async fn activate_services(
        &self,
        plan: &DeploymentPlan,
    ) -> Result<Vec<DeployWarning>, DeployError> {
        self.services.reload().await?;
        info!("service manager reloaded");

        for unit in plan.service_units() {
            self.services.enable_unit(unit).await?;
            info!(unit, "service enabled");
        }
        self.services.reload().await?;

        for unit in plan.service_units() {
            self.services.start_unit(unit).await?;
            info!(unit, "service started");
        }
        Ok(Vec::new())
    }

    async fn verify_services(
        &self,
        plan: &DeploymentPlan,
    ) -> Result<(Vec<UnitStatus>, Vec<DeployWarning>), DeployError> {
        let mut statuses = Vec::new();
        let mut warnings = Vec::new();

        for unit in plan.service_units() {
            let started_at = Instant::now();
            let mut status = self.services.unit_status(unit).await?;
            while status.is_settling() && started_at.elapsed() < self.verify_timeout {
                tokio::time::sleep(VERIFY_POLL_INTERVAL).await;
                status = self.services.unit_status(unit).await?;
            }

            if !(status.is_enabled() && status.is_running()) {
                warnings.push(DeployWarning::UnitNotRunning {
                    unit: status.name.clone(),
                    file_state: status.file_state.clone(),
                    active_state: status.active_state.clone(),
                });
            }
            statuses.push(status);
        }

        Ok((statuses, warnings))
    }
}

async fn install_application(
    plan: &DeploymentPlan,
    source_root: &Path,
) -> Result<Vec<DeployWarning>, DeployError> {
    let mut warnings = Vec::new();
    for script in &plan.script_paths {
        let source = source_root.join(script);
        let installed = files::install_optional(&source, &plan.bin_dir, |path| {
            DeployWarning::MissingScript { path }
        })
        .await?;
        if let Err(warning) = installed {
            warnings.push(warning);
        }
    }

    files::install_required(&source_root.join(&plan.manifest_file_name), &plan.bin_dir).await?;
    Ok(warnings)
}

async fn install_config(
    plan: &DeploymentPlan,
    source_root: &Path,
) -> Result<Vec<DeployWarning>, DeployError> {
    let source = source_root.join(&plan.config_file_name);
    match files::install_optional(&source, &plan.config_dir, |path| {
        DeployWarning::MissingConfig { path }
    })
    .await?
    {
        Ok(installed) => Ok(monitor_config::check_monitor_config_file(&installed).await),
        Err(warning) => Ok(vec![warning]),
    }
}

async fn install_units(
    plan: &DeploymentPlan,
    source_root: &Path,
) -> Result<Vec<DeployWarning>, DeployError> {
    files::ensure_directories(&[plan.service_dir.as_path()]).await?;

    let mut warnings = Vec::new();
    for unit in plan.service_units() {
        let source = source_root.join(unit);
        let installed = files::install_optional(&source, &plan.service_dir, |path| {
            DeployWarning::MissingUnit { path }
        })
        .await?;
        if let Err(warning) = installed {
            warnings.push(warning);
        }
    }
    Ok(warnings)
}
