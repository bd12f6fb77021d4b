use std::{env, path::PathBuf, time::Duration};

use thiserror::Error;

pub const DEFAULT_PYTHON: &str = "python3";
pub const DEFAULT_VERIFY_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployConfig {
    pub source_root: PathBuf,
    pub python: String,
    pub verify: bool,
    pub verify_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("VM_MONITOR_SOURCE_ROOT must not be empty")]
    EmptySourceRoot,
    #[error("unable to determine the current directory: {0}")]
    CurrentDir(#[source] std::io::Error),
    #[error("VM_MONITOR_PYTHON must not be empty")]
    EmptyPython,
    #[error("VM_MONITOR_VERIFY must be one of true, false, 1, 0, yes, no")]
    InvalidVerify,
    #[error("VM_MONITOR_VERIFY_TIMEOUT_SECS must be a valid u64")]
    InvalidVerifyTimeout,
}

impl DeployConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let source_root = match lookup("VM_MONITOR_SOURCE_ROOT") {
            Some(value) => {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Err(ConfigError::EmptySourceRoot);
                }
                PathBuf::from(trimmed)
            }
            None => env::current_dir().map_err(ConfigError::CurrentDir)?,
        };

        let python = match lookup("VM_MONITOR_PYTHON") {
            Some(value) => {
                let trimmed = value.trim().to_string();
                if trimmed.is_empty() {
                    return Err(ConfigError::EmptyPython);
                }
                trimmed
            }
            None => DEFAULT_PYTHON.to_string(),
        };

        let verify = lookup("VM_MONITOR_VERIFY")
            .map(|value| parse_bool(&value).ok_or(ConfigError::InvalidVerify))
            .transpose()?
            .unwrap_or(true);

        let verify_timeout = lookup("VM_MONITOR_VERIFY_TIMEOUT_SECS")
            .map(|value| {
                value
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| ConfigError::InvalidVerifyTimeout)
            })
            .transpose()?
            .unwrap_or(DEFAULT_VERIFY_TIMEOUT_SECS);

        Ok(Self {
            source_root,
            python,
            verify,
            verify_timeout: Duration::from_secs(verify_timeout),
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}
