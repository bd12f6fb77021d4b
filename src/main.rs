use std::sync::Arc;

use tracing::info;
use vm_monitor_deploy::{
    config::DeployConfig,
    host::SystemHost,
    logging,
    plan::DeploymentPlan,
    systemd_client::{ensure_systemd_available, DbusSystemdClient},
    Deployer,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = DeployConfig::from_env()?;
    ensure_systemd_available().await?;

    let plan = DeploymentPlan::standard();
    let host = Arc::new(SystemHost::new(config.python.clone()));
    let services = Arc::new(DbusSystemdClient::new());
    let deployer =
        Deployer::new(host, services).with_verification(config.verify, config.verify_timeout);

    info!(
        source_root = %config.source_root.display(),
        version = env!("CARGO_PKG_VERSION"),
        "vm monitor deployment starting"
    );

    let report = deployer.deploy(&plan, &config.source_root).await?;
    report.log_summary(&plan);
    Ok(())
}
