use std::path::Path;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::OnceCell;
use zbus::{zvariant::OwnedObjectPath, Connection, Proxy};

use crate::errors::DeployError;

const SYSTEMD_DESTINATION: &str = "org.freedesktop.systemd1";
const SYSTEMD_PATH: &str = "/org/freedesktop/systemd1";
const MANAGER_INTERFACE: &str = "org.freedesktop.systemd1.Manager";
const UNIT_INTERFACE: &str = "org.freedesktop.systemd1.Unit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitStatus {
    pub name: String,
    pub file_state: String,
    pub active_state: String,
}

impl UnitStatus {
    pub fn is_enabled(&self) -> bool {
        matches!(self.file_state.as_str(), "enabled" | "enabled-runtime")
    }

    pub fn is_running(&self) -> bool {
        self.active_state == "active"
    }

    /// Still coming up; worth polling again.
    pub fn is_settling(&self) -> bool {
        matches!(self.active_state.as_str(), "activating" | "reloading")
    }
}

type EnableChange = (String, String, String);
type JobRemoved = (u32, OwnedObjectPath, String, String);

#[async_trait]
pub trait ServiceManager: Send + Sync {
    async fn reload(&self) -> Result<(), DeployError>;
    async fn enable_unit(&self, unit: &str) -> Result<(), DeployError>;
    async fn start_unit(&self, unit: &str) -> Result<(), DeployError>;
    async fn unit_status(&self, unit: &str) -> Result<UnitStatus, DeployError>;
}

#[derive(Default)]
pub struct DbusSystemdClient {
    manager: OnceCell<Proxy<'static>>,
}

impl DbusSystemdClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager proxy on a single system-bus connection, subscribed to job signals.
    async fn manager(&self) -> Result<&Proxy<'static>, DeployError> {
        self.manager
            .get_or_try_init(|| async {
                let connection = Connection::system()
                    .await
                    .map_err(|err| DeployError::dbus("connect", err))?;

                let proxy = Proxy::new(
                    &connection,
                    SYSTEMD_DESTINATION,
                    SYSTEMD_PATH,
                    MANAGER_INTERFACE,
                )
                .await
                .map_err(|err| DeployError::dbus("manager proxy", err))?;

                let () = proxy
                    .call("Subscribe", &())
                    .await
                    .map_err(|err| DeployError::dbus("subscribe", err))?;
                Ok::<_, DeployError>(proxy)
            })
            .await
    }
}

#[async_trait]
impl ServiceManager for DbusSystemdClient {
    async fn reload(&self) -> Result<(), DeployError> {
        let proxy = self.manager().await?;
        let () = proxy
            .call("Reload", &())
            .await
            .map_err(|err| DeployError::dbus("reload", err))?;
        Ok(())
    }

    async fn enable_unit(&self, unit: &str) -> Result<(), DeployError> {
        let proxy = self.manager().await?;
        let (_carries_install_info, changes): (bool, Vec<EnableChange>) = proxy
            .call("EnableUnitFiles", &(vec![unit], false, false))
            .await
            .map_err(|err| DeployError::dbus("enable", err))?;

        for change in describe_enable_changes(&changes) {
            tracing::info!(unit, "{change}");
        }
        Ok(())
    }

    /// Queues a start job and waits for systemd to report how it ended.
    async fn start_unit(&self, unit: &str) -> Result<(), DeployError> {
        let proxy = self.manager().await?;
        let mut removed = proxy
            .receive_signal("JobRemoved")
            .await
            .map_err(|err| DeployError::dbus("job signal", err))?;

        let job: OwnedObjectPath = proxy
            .call("StartUnit", &(unit, "replace"))
            .await
            .map_err(|err| DeployError::dbus("start", err))?;
        tracing::debug!(unit, job = %job.as_str(), "start job queued");

        while let Some(message) = removed.next().await {
            let (_id, path, _unit, result): JobRemoved = message
                .body()
                .deserialize()
                .map_err(|err| DeployError::dbus("job signal", err))?;
            if path == job {
                return job_outcome(unit, &result);
            }
        }

        Err(DeployError::JobUnfinished {
            unit: unit.to_string(),
        })
    }

    async fn unit_status(&self, unit: &str) -> Result<UnitStatus, DeployError> {
        let proxy = self.manager().await?;
        let file_state: String = proxy
            .call("GetUnitFileState", &(unit,))
            .await
            .map_err(|err| DeployError::dbus("unit file state", err))?;

        let unit_path: OwnedObjectPath = proxy
            .call("LoadUnit", &(unit,))
            .await
            .map_err(|err| DeployError::dbus("load unit", err))?;

        let unit_proxy = Proxy::new(
            proxy.connection(),
            SYSTEMD_DESTINATION,
            unit_path.as_str().to_owned(),
            UNIT_INTERFACE,
        )
        .await
        .map_err(|err| DeployError::dbus("unit proxy", err))?;

        let active_state: String = unit_proxy
            .get_property("ActiveState")
            .await
            .map_err(|err| DeployError::dbus("active state", err))?;

        Ok(UnitStatus {
            name: unit.to_string(),
            file_state,
            active_state,
        })
    }
}

/// Fails unless the host was booted with systemd as init.
pub async fn ensure_systemd_available() -> Result<(), DeployError> {
    ensure_systemd_booted(Path::new("/run/systemd/system")).await
}

async fn ensure_systemd_booted(marker: &Path) -> Result<(), DeployError> {
    match tokio::fs::metadata(marker).await {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        _ => Err(DeployError::SystemdUnavailable),
    }
}

/// Maps the result string of a finished job the way `systemctl start` does.
pub fn job_outcome(unit: &str, result: &str) -> Result<(), DeployError> {
    match result {
        "done" => Ok(()),
        other => Err(DeployError::JobFailed {
            unit: unit.to_string(),
            result: other.to_string(),
        }),
    }
}

fn describe_enable_changes(changes: &[EnableChange]) -> Vec<String> {
    changes
        .iter()
        .map(|(kind, link, target)| match kind.as_str() {
            "symlink" => format!("created symlink {link} -> {target}"),
            "unlink" => format!("removed {link}"),
            other => format!("{other} {link} {target}").trim_end().to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(file_state: &str, active_state: &str) -> UnitStatus {
        UnitStatus {
            name: "vm-monitor-api.service".to_string(),
            file_state: file_state.to_string(),
            active_state: active_state.to_string(),
        }
    }

    #[test]
    fn classifies_unit_states() {
        assert!(status("enabled", "active").is_enabled());
        assert!(status("enabled", "active").is_running());
        assert!(!status("disabled", "active").is_enabled());
        assert!(status("enabled", "activating").is_settling());
        assert!(!status("enabled", "failed").is_running());
        assert!(!status("enabled", "failed").is_settling());
    }

    #[test]
    fn only_done_jobs_succeed() {
        job_outcome("vm-monitor-api.service", "done").expect("done is success");

        for result in ["failed", "timeout", "dependency", "canceled", "skipped"] {
            let error = job_outcome("vm-monitor-api.service", result).expect_err("job failed");
            assert!(matches!(
                &error,
                DeployError::JobFailed { result: actual, .. } if actual == result
            ));
        }
    }

    #[test]
    fn describes_symlink_changes() {
        let changes = vec![
            (
                "symlink".to_string(),
                "/etc/systemd/system/multi-user.target.wants/vm-monitor-api.service".to_string(),
                "/etc/systemd/system/vm-monitor-api.service".to_string(),
            ),
            (
                "unlink".to_string(),
                "/etc/systemd/system/old.service".to_string(),
                String::new(),
            ),
        ];

        assert_eq!(
            describe_enable_changes(&changes),
            vec![
                "created symlink /etc/systemd/system/multi-user.target.wants/vm-monitor-api.service -> /etc/systemd/system/vm-monitor-api.service".to_string(),
                "removed /etc/systemd/system/old.service".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn missing_marker_means_no_systemd() {
        let dir = tempfile::tempdir().expect("tempdir");
        let error = ensure_systemd_booted(&dir.path().join("absent"))
            .await
            .expect_err("expected missing systemd");
        assert!(matches!(error, DeployError::SystemdUnavailable));

        ensure_systemd_booted(dir.path())
            .await
            .expect("directory marker is accepted");
    }
}
