use std::{io, path::PathBuf};

use thiserror::Error;

use crate::domain::steps::DeployStep;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("invalid deployment plan: {message}")]
    InvalidPlan { message: String },
    #[error("systemd is not running on this host")]
    SystemdUnavailable,
    #[error("failed to create directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to copy {} to {}: {source}", .from.display(), .to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("dependency manifest not found at {}", .path.display())]
    MissingManifest { path: PathBuf },
    #[error("failed to set mode {mode:o} on {}: {source}", .path.display())]
    SetMode {
        path: PathBuf,
        mode: u32,
        #[source]
        source: io::Error,
    },
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },
    #[error("systemd {operation} failed: {source}")]
    Dbus {
        operation: &'static str,
        #[source]
        source: zbus::Error,
    },
    #[error("start job for {unit} finished with result `{result}`")]
    JobFailed { unit: String, result: String },
    #[error("lost track of the start job for {unit} before it finished")]
    JobUnfinished { unit: String },
    #[error("step `{step}` failed: {source}")]
    Step {
        step: DeployStep,
        #[source]
        source: Box<DeployError>,
    },
}

impl DeployError {
    pub fn invalid_plan(message: impl Into<String>) -> Self {
        Self::InvalidPlan {
            message: message.into(),
        }
    }

    pub fn dbus(operation: &'static str, source: zbus::Error) -> Self {
        Self::Dbus { operation, source }
    }

    /// Step the error was raised in, if it has been attributed to one.
    pub fn step(&self) -> Option<DeployStep> {
        match self {
            Self::Step { step, .. } => Some(*step),
            _ => None,
        }
    }
}

/// Non-fatal conditions. Logged when they occur and collected in the report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeployWarning {
    #[error("script {} not found, skipping", .path.display())]
    MissingScript { path: PathBuf },
    #[error("config file {} not found, skipping", .path.display())]
    MissingConfig { path: PathBuf },
    #[error("config file {} is not valid YAML: {message}", .path.display())]
    UnreadableConfig { path: PathBuf, message: String },
    #[error("config file {} is missing keys required by {program}: {}", .path.display(), .keys.join(", "))]
    IncompleteConfig {
        path: PathBuf,
        program: &'static str,
        keys: Vec<&'static str>,
    },
    #[error("unit file {} not found, skipping", .path.display())]
    MissingUnit { path: PathBuf },
    #[error("unit {unit} is {file_state}/{active_state} after start")]
    UnitNotRunning {
        unit: String,
        file_state: String,
        active_state: String,
    },
}
