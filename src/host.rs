//! Host-level operations backed by external commands
//!
//! Account management, the python environment, and ownership changes are done by
//! the usual system tools. Each tool can be pointed at an explicit binary with a
//! `{TOOL}_BIN` environment variable, falling back to `PATH` lookup.

use std::{
    env,
    ffi::OsStr,
    path::{Path, PathBuf},
    process::Output,
};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::errors::DeployError;

pub const NOLOGIN_SHELL: &str = "/usr/sbin/nologin";

#[async_trait]
pub trait HostOps: Send + Sync {
    async fn account_exists(&self, name: &str) -> Result<bool, DeployError>;
    async fn create_system_account(&self, name: &str) -> Result<(), DeployError>;
    async fn create_virtualenv(&self, venv_dir: &Path) -> Result<(), DeployError>;
    async fn install_requirements(&self, venv_dir: &Path, manifest: &Path)
        -> Result<(), DeployError>;
    async fn change_owner(
        &self,
        path: &Path,
        user: &str,
        group: &str,
        recursive: bool,
    ) -> Result<(), DeployError>;
}

#[derive(Debug, Clone)]
pub struct SystemHost {
    python: String,
}

impl SystemHost {
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
        }
    }
}

#[async_trait]
impl HostOps for SystemHost {
    async fn account_exists(&self, name: &str) -> Result<bool, DeployError> {
        let id = tool_path("id");
        let output = spawn(&id, ["-u", name]).await?;
        Ok(output.status.success())
    }

    async fn create_system_account(&self, name: &str) -> Result<(), DeployError> {
        let useradd = tool_path("useradd");
        run_command(
            &useradd,
            [
                "--system",
                "--no-create-home",
                "--shell",
                NOLOGIN_SHELL,
                "--user-group",
                name,
            ],
        )
        .await
        .map(|_| ())
    }

    async fn create_virtualenv(&self, venv_dir: &Path) -> Result<(), DeployError> {
        run_command(
            &self.python,
            [OsStr::new("-m"), OsStr::new("venv"), venv_dir.as_os_str()],
        )
        .await
        .map(|_| ())
    }

    async fn install_requirements(
        &self,
        venv_dir: &Path,
        manifest: &Path,
    ) -> Result<(), DeployError> {
        let pip = venv_pip(venv_dir);
        run_command(
            pip.as_os_str(),
            [
                OsStr::new("install"),
                OsStr::new("--requirement"),
                manifest.as_os_str(),
            ],
        )
        .await
        .map(|_| ())
    }

    async fn change_owner(
        &self,
        path: &Path,
        user: &str,
        group: &str,
        recursive: bool,
    ) -> Result<(), DeployError> {
        let chown = tool_path("chown");
        let owner = format!("{user}:{group}");
        let mut args = Vec::with_capacity(3);
        if recursive {
            args.push(OsStr::new("-R"));
        }
        args.push(OsStr::new(&owner));
        args.push(path.as_os_str());

        run_command(&chown, args).await.map(|_| ())
    }
}

/// Reads `{TOOL}_BIN`, falling back to the bare tool name.
pub fn tool_path(tool: &str) -> String {
    let env_var = format!("{}_BIN", tool.to_uppercase());
    env::var(&env_var)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| tool.to_string())
}

pub fn venv_python(venv_dir: &Path) -> PathBuf {
    venv_dir.join("bin").join("python")
}

pub fn venv_pip(venv_dir: &Path) -> PathBuf {
    venv_dir.join("bin").join("pip")
}

/// Runs a command to completion and fails on a non-zero exit.
pub async fn run_command<P, I, S>(program: P, args: I) -> Result<Output, DeployError>
where
    P: AsRef<OsStr>,
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<S> = args.into_iter().collect();
    let command = describe(program.as_ref(), &args);
    let output = spawn(program, args).await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(DeployError::CommandFailed {
            command,
            status: output.status.to_string(),
            stderr,
        });
    }

    Ok(output)
}

async fn spawn<P, I, S>(program: P, args: I) -> Result<Output, DeployError>
where
    P: AsRef<OsStr>,
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<S> = args.into_iter().collect();
    let command = describe(program.as_ref(), &args);
    debug!(command = %command, "running command");

    Command::new(program)
        .args(&args)
        .output()
        .await
        .map_err(|source| DeployError::Spawn { command, source })
}

fn describe<S: AsRef<OsStr>>(program: &OsStr, args: &[S]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(|arg| AsRef::<OsStr>::as_ref(arg)))
        .map(|part| part.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describes_command_line() {
        let line = describe(OsStr::new("chown"), &["-R", "vmmonitor:vmmonitor", "/etc/vm_monitor"]);
        assert_eq!(line, "chown -R vmmonitor:vmmonitor /etc/vm_monitor");
    }

    #[test]
    fn venv_binaries_live_under_bin() {
        let venv = Path::new("/usr/local/lib/vm_monitor/venv");
        assert_eq!(
            venv_pip(venv),
            PathBuf::from("/usr/local/lib/vm_monitor/venv/bin/pip")
        );
        assert_eq!(
            venv_python(venv),
            PathBuf::from("/usr/local/lib/vm_monitor/venv/bin/python")
        );
    }

    #[test]
    fn tool_path_falls_back_to_name() {
        assert_eq!(tool_path("vm-monitor-no-such-tool"), "vm-monitor-no-such-tool");
    }

    #[tokio::test]
    async fn successful_command_returns_output() {
        let output = run_command("sh", ["-c", "echo ready"])
            .await
            .expect("command should succeed");
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "ready");
    }

    #[tokio::test]
    async fn failing_command_surfaces_stderr() {
        let error = run_command("sh", ["-c", "echo boom >&2; exit 3"])
            .await
            .expect_err("command should fail");

        match error {
            DeployError::CommandFailed {
                command,
                status,
                stderr,
            } => {
                assert_eq!(command, "sh -c echo boom >&2; exit 3");
                assert!(status.contains('3'));
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let error = run_command("vm-monitor-definitely-missing", Vec::<&str>::new())
            .await
            .expect_err("spawn should fail");
        assert!(matches!(error, DeployError::Spawn { .. }));
    }
}
