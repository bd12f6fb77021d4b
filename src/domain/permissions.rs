//! Applies the ownership table in a single pass

use std::{os::unix::fs::PermissionsExt, path::Path};

use tracing::info;

use crate::{
    errors::DeployError,
    host::HostOps,
    plan::{Owner, OwnershipRule},
};

pub const ROOT_ACCOUNT: &str = "root";

pub fn owner_name<'a>(owner: Owner, service_account: &'a str) -> &'a str {
    match owner {
        Owner::ServiceAccount => service_account,
        Owner::Root => ROOT_ACCOUNT,
    }
}

pub async fn apply_ownership(
    host: &dyn HostOps,
    rules: &[OwnershipRule],
    service_account: &str,
) -> Result<(), DeployError> {
    for rule in rules {
        let owner = owner_name(rule.owner, service_account);
        host.change_owner(&rule.path, owner, owner, rule.recursive).await?;

        if let Some(mode) = rule.mode {
            set_mode(&rule.path, mode).await?;
        }

        info!(
            path = %rule.path.display(),
            owner,
            recursive = rule.recursive,
            mode = ?rule.mode.map(|mode| format!("{mode:o}")),
            "ownership applied"
        );
    }
    Ok(())
}

async fn set_mode(path: &Path, mode: u32) -> Result<(), DeployError> {
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .await
        .map_err(|source| DeployError::SetMode {
            path: path.to_path_buf(),
            mode,
            source,
        })
}
