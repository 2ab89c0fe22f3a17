// Install preferences
//
// `SettingsDraft` is the mutable, UI-bound record the preference screens edit.
// `InstallSettings` is the frozen result of validating a draft; it is the only form the
// orchestrator accepts, so an unvalidated record can never reach a state-mutating phase.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::InstallerConfig;
use crate::error::ValidationError;
use crate::utils::validation::{validate_install_directory, validate_web_port};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsDraft {
    pub launch_on_login: bool,
    pub auto_update: bool,
    pub install_path: String,
    pub web_port: String,
}

impl SettingsDraft {
    pub fn from_config(config: &InstallerConfig) -> Self {
        Self {
            launch_on_login: true,
            auto_update: false,
            install_path: config.default_install_dir.to_string_lossy().to_string(),
            web_port: config.default_web_port.clone(),
        }
    }

    /// Validate and freeze. Directory is checked before port, matching the order the
    /// preference screen reports problems in.
    pub fn freeze(&self) -> Result<InstallSettings, ValidationError> {
        let install_path = self.install_path.trim();
        if !validate_install_directory(install_path) {
            return Err(ValidationError::InstallDirectory(self.install_path.clone()));
        }
        if !validate_web_port(&self.web_port) {
            return Err(ValidationError::WebPort(self.web_port.clone()));
        }
        Ok(InstallSettings {
            launch_on_login: self.launch_on_login,
            auto_update: self.auto_update,
            install_path: PathBuf::from(install_path),
            web_port: self.web_port.clone(),
        })
    }
}

/// Validated, immutable install preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallSettings {
    launch_on_login: bool,
    auto_update: bool,
    install_path: PathBuf,
    web_port: String,
}

impl InstallSettings {
    pub fn launch_on_login(&self) -> bool {
        self.launch_on_login
    }

    /// Stored only; self-update is not implemented.
    pub fn auto_update(&self) -> bool {
        self.auto_update
    }

    pub fn install_path(&self) -> &Path {
        &self.install_path
    }

    pub fn web_port(&self) -> &str {
        &self.web_port
    }
}
