// Installer configuration
//
// Precedence (lowest to highest): built-in defaults, optional TOML file, environment
// variables prefixed with `WIREPOD_INSTALLER_`.

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "wirepod-installer.toml";
pub const CONFIG_PATH_ENV: &str = "WIREPOD_INSTALLER_CONFIG";
pub const ENV_PREFIX: &str = "WIREPOD_INSTALLER";
/// Folder under the per-user config directory that may hold `CONFIG_FILE_NAME`.
pub const USER_CONFIG_FOLDER: &str = "wire-pod-installer";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InstallerConfig {
    pub release_owner: String,
    pub release_repo: String,
    pub api_base_url: String,
    pub download_base_url: String,
    pub artifact_name: String,
    /// Full artifact URL; bypasses tag-based URL construction when set.
    pub artifact_url: Option<String>,
    pub default_install_dir: PathBuf,
    pub default_web_port: String,
    /// Service executable, relative to the install directory.
    pub service_executable: PathBuf,
    pub marker_file_name: String,
    pub state_dir: PathBuf,
    pub autostart_dir: PathBuf,
    pub autostart_name: String,
    pub registry_key: String,
    pub elevation_probe_dir: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub http_timeout_secs: u64,
    pub stop_timeout_secs: u64,
    pub kill_timeout_secs: u64,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            release_owner: "kercre123".to_string(),
            release_repo: "wire-pod".to_string(),
            api_base_url: "https://api.github.com".to_string(),
            download_base_url: "https://github.com".to_string(),
            artifact_name: default_artifact_name().to_string(),
            artifact_url: None,
            default_install_dir: default_install_dir(),
            default_web_port: "8080".to_string(),
            service_executable: default_service_executable(),
            marker_file_name: "wirepodrunningPID".to_string(),
            state_dir: PathBuf::from("/etc/wire-pod"),
            autostart_dir: PathBuf::from("/etc/xdg/autostart"),
            autostart_name: "wire-pod".to_string(),
            registry_key: r"SOFTWARE\wire-pod".to_string(),
            elevation_probe_dir: PathBuf::from("/etc"),
            log_dir: None,
            http_timeout_secs: 30,
            stop_timeout_secs: 10,
            kill_timeout_secs: 5,
        }
    }
}

fn default_artifact_name() -> &'static str {
    if cfg!(windows) {
        "wire-pod-win-amd64.zip"
    } else if cfg!(target_arch = "aarch64") {
        "wire-pod-linux-arm64.zip"
    } else {
        "wire-pod-linux-amd64.zip"
    }
}

fn default_install_dir() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(r"C:\Program Files\wire-pod")
    } else {
        PathBuf::from("/opt/wire-pod")
    }
}

fn default_service_executable() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from("chipper").join("chipper.exe")
    } else {
        PathBuf::from("chipper").join("chipper")
    }
}

/// Pick the TOML file to read: an explicit path always wins, then the file beside the
/// executable, then the per-user file. Falls back to the executable's folder when
/// neither exists so the missing-file path stays predictable in logs.
fn select_config_file(
    explicit: Option<PathBuf>,
    beside_executable: PathBuf,
    per_user: Option<PathBuf>,
) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }
    if beside_executable.is_file() {
        return beside_executable;
    }
    match per_user {
        Some(path) if path.is_file() => {
            debug!(
                "[PHASE: initialization] [STEP: config] Using per-user configuration {:?}",
                path
            );
            path
        }
        _ => beside_executable,
    }
}

impl InstallerConfig {
    /// Load the effective configuration.
    ///
    /// The TOML file is taken from `WIREPOD_INSTALLER_CONFIG` if set, else from
    /// `wirepod-installer.toml` beside the executable, else from the per-user config
    /// directory (`~/.config/wire-pod-installer/` on Linux). A missing file is not an error.
    pub fn load() -> Result<Self> {
        let file = select_config_file(
            std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from),
            crate::utils::path_resolver::resolve_deployment_folder().join(CONFIG_FILE_NAME),
            dirs::config_dir().map(|dir| dir.join(USER_CONFIG_FOLDER).join(CONFIG_FILE_NAME)),
        );
        Self::load_from(Some(&file))
    }

    pub fn load_from(file: Option<&Path>) -> Result<Self> {
        debug!(
            "[PHASE: initialization] [STEP: config] load_from entered (file={:?})",
            file
        );

        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path.to_path_buf()).required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .ignore_empty(true),
        );

        let cfg: InstallerConfig = builder
            .build()
            .context("Failed to assemble installer configuration")?
            .try_deserialize()
            .context("Invalid installer configuration")?;

        info!(
            "[PHASE: initialization] [STEP: config] Configuration loaded (release={}/{}, artifact={}, state_dir={:?})",
            cfg.release_owner, cfg.release_repo, cfg.artifact_name, cfg.state_dir
        );
        Ok(cfg)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to render configuration as TOML")
    }

    /// Artifact URL for `tag`, honouring `artifact_url` when configured.
    pub fn artifact_url_for(&self, tag: &str) -> String {
        if let Some(url) = self.artifact_url.as_deref().filter(|u| !u.trim().is_empty()) {
            return url.to_string();
        }
        format!(
            "{}/{}/{}/releases/download/{}/{}",
            self.download_base_url.trim_end_matches('/'),
            self.release_owner,
            self.release_repo,
            tag,
            self.artifact_name
        )
    }

    pub fn latest_release_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/releases/latest",
            self.api_base_url.trim_end_matches('/'),
            self.release_owner,
            self.release_repo
        )
    }

    pub fn marker_path(&self) -> PathBuf {
        std::env::temp_dir().join(&self.marker_file_name)
    }

    pub fn service_executable_in(&self, install_dir: &Path) -> PathBuf {
        install_dir.join(&self.service_executable)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    pub fn kill_timeout(&self) -> Duration {
        Duration::from_secs(self.kill_timeout_secs)
    }
}
