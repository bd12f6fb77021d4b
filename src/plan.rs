//! The fixed deployment table
//!
//! Every side effect of a deployment is derived from a `DeploymentPlan`. The plan
//! is built once in `main` and only ever borrowed afterwards.

use std::path::{Component, Path, PathBuf};

use regex::Regex;

use crate::errors::DeployError;

pub const SERVICE_ACCOUNT: &str = "vmmonitor";
pub const SYSTEMD_UNIT_DIR: &str = "/etc/systemd/system";
pub const BIN_DIR: &str = "/usr/local/lib/vm_monitor";
pub const CONFIG_DIR: &str = "/etc/vm_monitor";
pub const DATA_DIR: &str = "/var/lib/vm_monitor";
pub const LOG_DIR: &str = "/var/log/vm_monitor";
pub const API_SERVICE_UNIT: &str = "vm-monitor-api.service";
pub const CLIENT_SERVICE_UNIT: &str = "vm-monitor-client.service";
pub const CONFIG_FILE_NAME: &str = "config.yaml";
pub const MANIFEST_FILE_NAME: &str = "requirements.txt";
pub const VENV_DIR_NAME: &str = "venv";
pub const SCRIPT_PATHS: [&str; 3] = [
    "vm_monitor_api.py",
    "vm_monitor_client.py",
    "vm_monitor_db.py",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentPlan {
    pub service_account: String,
    pub service_dir: PathBuf,
    pub bin_dir: PathBuf,
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub api_service_unit: String,
    pub client_service_unit: String,
    pub config_file_name: String,
    pub manifest_file_name: String,
    pub venv_dir_name: String,
    pub script_paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    ServiceAccount,
    Root,
}

/// One row of the ownership table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipRule {
    pub path: PathBuf,
    pub owner: Owner,
    pub recursive: bool,
    pub mode: Option<u32>,
}

impl DeploymentPlan {
    pub fn standard() -> Self {
        Self {
            service_account: SERVICE_ACCOUNT.to_string(),
            service_dir: PathBuf::from(SYSTEMD_UNIT_DIR),
            bin_dir: PathBuf::from(BIN_DIR),
            config_dir: PathBuf::from(CONFIG_DIR),
            data_dir: PathBuf::from(DATA_DIR),
            log_dir: PathBuf::from(LOG_DIR),
            api_service_unit: API_SERVICE_UNIT.to_string(),
            client_service_unit: CLIENT_SERVICE_UNIT.to_string(),
            config_file_name: CONFIG_FILE_NAME.to_string(),
            manifest_file_name: MANIFEST_FILE_NAME.to_string(),
            venv_dir_name: VENV_DIR_NAME.to_string(),
            script_paths: SCRIPT_PATHS.iter().map(PathBuf::from).collect(),
        }
    }

    /// Same plan with every directory moved under `root`.
    pub fn rebased(&self, root: &Path) -> Self {
        let rebase = |path: &Path| -> PathBuf {
            let relative: PathBuf = path
                .components()
                .filter(|component| !matches!(component, Component::RootDir | Component::Prefix(_)))
                .collect();
            root.join(relative)
        };

        Self {
            service_dir: rebase(&self.service_dir),
            bin_dir: rebase(&self.bin_dir),
            config_dir: rebase(&self.config_dir),
            data_dir: rebase(&self.data_dir),
            log_dir: rebase(&self.log_dir),
            ..self.clone()
        }
    }

    pub fn directories(&self) -> [&Path; 4] {
        [
            self.bin_dir.as_path(),
            self.config_dir.as_path(),
            self.data_dir.as_path(),
            self.log_dir.as_path(),
        ]
    }

    /// Enable and start order: client before API.
    pub fn service_units(&self) -> [&str; 2] {
        [
            self.client_service_unit.as_str(),
            self.api_service_unit.as_str(),
        ]
    }

    pub fn venv_dir(&self) -> PathBuf {
        self.bin_dir.join(&self.venv_dir_name)
    }

    pub fn installed_manifest(&self) -> PathBuf {
        self.bin_dir.join(&self.manifest_file_name)
    }

    pub fn installed_config(&self) -> PathBuf {
        self.config_dir.join(&self.config_file_name)
    }

    pub fn ownership_rules(&self) -> Vec<OwnershipRule> {
        [&self.bin_dir, &self.data_dir, &self.config_dir]
            .into_iter()
            .map(|path| OwnershipRule {
                path: path.clone(),
                owner: Owner::ServiceAccount,
                recursive: true,
                mode: None,
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), DeployError> {
        let account = Regex::new(r"^[a-z_][a-z0-9_-]{0,31}$")
            .map_err(|err| DeployError::invalid_plan(format!("account pattern: {err}")))?;
        if !account.is_match(&self.service_account) {
            return Err(DeployError::invalid_plan(format!(
                "`{}` is not a valid system account name",
                self.service_account
            )));
        }

        for directory in self.directories().into_iter().chain([self.service_dir.as_path()]) {
            if !directory.is_absolute() {
                return Err(DeployError::invalid_plan(format!(
                    "directory {} must be absolute",
                    directory.display()
                )));
            }
        }

        for unit in self.service_units() {
            validate_unit_name(unit)?;
        }
        if self.api_service_unit == self.client_service_unit {
            return Err(DeployError::invalid_plan(
                "api and client units must be distinct",
            ));
        }

        if self.script_paths.is_empty() {
            return Err(DeployError::invalid_plan("no scripts to install"));
        }
        for name in [
            &self.config_file_name,
            &self.manifest_file_name,
            &self.venv_dir_name,
        ] {
            if name.trim().is_empty() || name.contains('/') {
                return Err(DeployError::invalid_plan(format!(
                    "`{name}` must be a plain file name"
                )));
            }
        }

        Ok(())
    }
}

fn validate_unit_name(unit: &str) -> Result<(), DeployError> {
    let Some(stem) = unit.strip_suffix(".service") else {
        return Err(DeployError::invalid_plan(format!(
            "unit `{unit}` must end with .service"
        )));
    };

    if stem.is_empty()
        || !unit.chars().all(|character| {
            character.is_ascii_alphanumeric()
                || character == '-'
                || character == '_'
                || character == '@'
                || character == ':'
                || character == '.'
        })
    {
        return Err(DeployError::invalid_plan(format!(
            "unit `{unit}` must contain only alphanumeric characters, dashes, underscores, dots, @, and :"
        )));
    }

    Ok(())
}
