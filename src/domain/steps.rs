//! Ordered list of deployment steps

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeployStep {
    EnsureAccount,
    EnsureDirectories,
    InstallApplication,
    ProvisionEnvironment,
    InstallConfig,
    InstallUnits,
    ApplyOwnership,
    ActivateServices,
    VerifyServices,
}

impl DeployStep {
    pub const ALL: [DeployStep; 9] = [
        DeployStep::EnsureAccount,
        DeployStep::EnsureDirectories,
        DeployStep::InstallApplication,
        DeployStep::ProvisionEnvironment,
        DeployStep::InstallConfig,
        DeployStep::InstallUnits,
        DeployStep::ApplyOwnership,
        DeployStep::ActivateServices,
        DeployStep::VerifyServices,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::EnsureAccount => "ensure-account",
            Self::EnsureDirectories => "ensure-directories",
            Self::InstallApplication => "install-application",
            Self::ProvisionEnvironment => "provision-environment",
            Self::InstallConfig => "install-config",
            Self::InstallUnits => "install-units",
            Self::ApplyOwnership => "apply-ownership",
            Self::ActivateServices => "activate-services",
            Self::VerifyServices => "verify-services",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::EnsureAccount => "ensuring service account",
            Self::EnsureDirectories => "creating directories",
            Self::InstallApplication => "installing application files",
            Self::ProvisionEnvironment => "provisioning python environment",
            Self::InstallConfig => "installing configuration",
            Self::InstallUnits => "installing systemd unit files",
            Self::ApplyOwnership => "applying ownership",
            Self::ActivateServices => "enabling and starting services",
            Self::VerifyServices => "verifying service state",
        }
    }

    /// Whether the step can be skipped by configuration.
    pub fn is_optional(self) -> bool {
        matches!(self, Self::VerifyServices)
    }
}

impl fmt::Display for DeployStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::DeployStep;

    #[test]
    fn account_first_activation_before_verification() {
        assert_eq!(DeployStep::ALL[0], DeployStep::EnsureAccount);
        let position = |step| {
            DeployStep::ALL
                .iter()
                .position(|candidate| *candidate == step)
                .expect("step listed")
        };

        let activate = position(DeployStep::ActivateServices);
        let provision = position(DeployStep::ProvisionEnvironment);
        assert!(position(DeployStep::InstallApplication) < provision);
        assert!(position(DeployStep::InstallUnits) < activate);
        assert!(position(DeployStep::ApplyOwnership) < activate);
        assert_eq!(DeployStep::ALL[8], DeployStep::VerifyServices);
    }

    #[test]
    fn only_verification_is_optional() {
        let optional: Vec<_> = DeployStep::ALL
            .into_iter()
            .filter(|step| step.is_optional())
            .collect();
        assert_eq!(optional, vec![DeployStep::VerifyServices]);
    }
}
