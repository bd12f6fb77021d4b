//! Directory creation and file installation
//!
//! Optional inputs (scripts, config, unit files) that are missing at the source
//! root become warnings. The dependency manifest is mandatory.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::info;

use crate::errors::{DeployError, DeployWarning};

/// Creates each directory with its parents. Existing directories are left alone.
pub async fn ensure_directories(directories: &[&Path]) -> Result<(), DeployError> {
    for directory in directories {
        fs::create_dir_all(directory)
            .await
            .map_err(|source| DeployError::CreateDir {
                path: directory.to_path_buf(),
                source,
            })?;
        info!(path = %directory.display(), "directory ready");
    }
    Ok(())
}

/// Copies `source` into `target_dir`, keeping its file name.
pub async fn install_file(source: &Path, target_dir: &Path) -> Result<PathBuf, DeployError> {
    let file_name = source.file_name().ok_or_else(|| DeployError::Copy {
        from: source.to_path_buf(),
        to: target_dir.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "source has no file name"),
    })?;
    let target = target_dir.join(file_name);

    fs::copy(source, &target)
        .await
        .map_err(|err| DeployError::Copy {
            from: source.to_path_buf(),
            to: target.clone(),
            source: err,
        })?;

    info!(from = %source.display(), to = %target.display(), "installed file");
    Ok(target)
}

/// Copies the file if it exists, otherwise hands back the warning built by `missing`.
pub async fn install_optional<F>(
    source: &Path,
    target_dir: &Path,
    missing: F,
) -> Result<Result<PathBuf, DeployWarning>, DeployError>
where
    F: FnOnce(PathBuf) -> DeployWarning,
{
    if !is_file(source).await {
        return Ok(Err(missing(source.to_path_buf())));
    }
    install_file(source, target_dir).await.map(Ok)
}

pub async fn install_required(source: &Path, target_dir: &Path) -> Result<PathBuf, DeployError> {
    if !is_file(source).await {
        return Err(DeployError::MissingManifest {
            path: source.to_path_buf(),
        });
    }
    install_file(source, target_dir).await
}

pub async fn is_file(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|metadata| metadata.is_file())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn directories_are_created_with_parents_and_idempotent() {
        let root = tempfile::tempdir().expect("tempdir");
        let nested = root.path().join("usr/local/lib/vm_monitor");
        let logs = root.path().join("var/log/vm_monitor");

        ensure_directories(&[nested.as_path(), logs.as_path()]).await.expect("first run");
        std::fs::write(nested.join("marker"), "keep").expect("write marker");
        ensure_directories(&[nested.as_path(), logs.as_path()]).await.expect("second run");

        assert!(logs.is_dir());
        assert_eq!(
            std::fs::read_to_string(nested.join("marker")).expect("marker survives"),
            "keep"
        );
    }

    #[tokio::test]
    async fn optional_file_is_copied_when_present() {
        let source = tempfile::tempdir().expect("source");
        let target = tempfile::tempdir().expect("target");
        let script = source.path().join("vm_monitor_db.py");
        std::fs::write(&script, "print('db')").expect("write script");

        let installed = install_optional(&script, target.path(), |path| {
            DeployWarning::MissingScript { path }
        })
        .await
        .expect("copy succeeds")
        .expect("file present");

        assert_eq!(installed, target.path().join("vm_monitor_db.py"));
        assert_eq!(
            std::fs::read_to_string(installed).expect("read copy"),
            "print('db')"
        );
    }

    #[tokio::test]
    async fn optional_file_missing_yields_warning() {
        let source = tempfile::tempdir().expect("source");
        let target = tempfile::tempdir().expect("target");
        let script = source.path().join("vm_monitor_api.py");

        let warning = install_optional(&script, target.path(), |path| {
            DeployWarning::MissingScript { path }
        })
        .await
        .expect("no fatal error")
        .expect_err("expected warning");

        assert_eq!(warning, DeployWarning::MissingScript { path: script });
        assert!(!target.path().join("vm_monitor_api.py").exists());
    }

    #[tokio::test]
    async fn required_file_missing_is_fatal() {
        let source = tempfile::tempdir().expect("source");
        let target = tempfile::tempdir().expect("target");

        let error = install_required(&source.path().join("requirements.txt"), target.path())
            .await
            .expect_err("manifest is mandatory");
        assert!(matches!(error, DeployError::MissingManifest { .. }));
    }

    #[tokio::test]
    async fn copy_into_missing_directory_is_fatal() {
        let source = tempfile::tempdir().expect("source");
        let manifest = source.path().join("requirements.txt");
        std::fs::write(&manifest, "flask\n").expect("write manifest");

        let error = install_required(&manifest, &source.path().join("absent"))
            .await
            .expect_err("target directory does not exist");
        assert!(matches!(error, DeployError::Copy { .. }));
    }
}
