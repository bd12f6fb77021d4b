//! Checks the monitor's `config.yaml` against the keys its programs read
//!
//! Both monitor programs refuse to start when a key is missing, so the check
//! surfaces that at deploy time. Only presence is checked, never values.
//! Problems are warnings; the file is installed either way.

use std::path::Path;

use serde::Deserialize;
use serde_yaml::Mapping;

use crate::errors::DeployWarning;

pub const CLIENT_PROGRAM: &str = "vm_monitor_client.py";
pub const API_PROGRAM: &str = "vm_monitor_api.py";
pub const CLIENT_REQUIRED_KEYS: [&str; 3] = ["sample_interval", "report_interval", "db_file_path"];
pub const API_REQUIRED_KEYS: [&str; 3] = ["host_ip", "port_number", "db_file_path"];

#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct MonitorConfig {
    entries: Mapping,
}

impl MonitorConfig {
    fn missing<'a>(&self, required: &[&'a str]) -> Vec<&'a str> {
        required
            .iter()
            .copied()
            .filter(|key| !self.entries.contains_key(*key))
            .collect()
    }
}

pub fn check_monitor_config(path: &Path, contents: &str) -> Vec<DeployWarning> {
    let config: MonitorConfig = match serde_yaml::from_str(contents) {
        Ok(config) => config,
        Err(err) => {
            return vec![DeployWarning::UnreadableConfig {
                path: path.to_path_buf(),
                message: err.to_string(),
            }]
        }
    };

    [
        (CLIENT_PROGRAM, &CLIENT_REQUIRED_KEYS),
        (API_PROGRAM, &API_REQUIRED_KEYS),
    ]
    .into_iter()
    .filter_map(|(program, required)| {
        let keys = config.missing(required);
        (!keys.is_empty()).then(|| DeployWarning::IncompleteConfig {
            path: path.to_path_buf(),
            program,
            keys,
        })
    })
    .collect()
}

pub async fn check_monitor_config_file(path: &Path) -> Vec<DeployWarning> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => check_monitor_config(path, &contents),
        Err(err) => vec![DeployWarning::UnreadableConfig {
            path: path.to_path_buf(),
            message: err.to_string(),
        }],
    }
}
