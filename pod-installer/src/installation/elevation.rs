// Elevation guard
//
// Privilege is probed by attempting something only a privileged principal can do, never by
// trusting a claimed identity. Windows: open the first physical drive. Elsewhere: create and
// remove a probe file in a root-owned directory (`/etc` by default).

use log::{debug, info, warn};
use std::path::PathBuf;

use crate::config::InstallerConfig;
use crate::error::PrivilegeError;

pub trait PrivilegeProbe: Send + Sync {
    /// Side-effect-free from the caller's point of view; `false` must be treated as fatal.
    fn is_elevated(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct ElevationGuard {
    #[cfg_attr(windows, allow(dead_code))]
    probe_dir: PathBuf,
}

impl ElevationGuard {
    pub fn new(probe_dir: impl Into<PathBuf>) -> Self {
        Self {
            probe_dir: probe_dir.into(),
        }
    }

    pub fn from_config(config: &InstallerConfig) -> Self {
        Self::new(config.elevation_probe_dir.clone())
    }

    #[cfg(windows)]
    fn probe(&self) -> bool {
        match std::fs::File::open(r"\\.\PHYSICALDRIVE0") {
            Ok(_) => true,
            Err(e) => {
                debug!(
                    "[PHASE: preflight] [STEP: elevation] Raw drive open failed: {}",
                    e
                );
                false
            }
        }
    }

    #[cfg(not(windows))]
    fn probe(&self) -> bool {
        let probe_path = self
            .probe_dir
            .join(format!(".wirepod-installer-probe-{}", uuid::Uuid::new_v4().simple()));
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&probe_path)
        {
            Ok(file) => {
                drop(file);
                if let Err(e) = std::fs::remove_file(&probe_path) {
                    warn!(
                        "[PHASE: preflight] [STEP: elevation] Failed to remove probe file {:?}: {}",
                        probe_path, e
                    );
                }
                true
            }
            Err(e) => {
                debug!(
                    "[PHASE: preflight] [STEP: elevation] Probe in {:?} failed: {}",
                    self.probe_dir, e
                );
                false
            }
        }
    }
}

impl PrivilegeProbe for ElevationGuard {
    fn is_elevated(&self) -> bool {
        let elevated = self.probe();
        info!(
            "[PHASE: preflight] [STEP: elevation] is_elevated exit (elevated={})",
            elevated
        );
        elevated
    }
}

/// Fail with `PrivilegeError::NotElevated` unless `probe` reports elevation.
pub fn require_elevated(probe: &dyn PrivilegeProbe) -> Result<(), PrivilegeError> {
    if probe.is_elevated() {
        Ok(())
    } else {
        Err(PrivilegeError::NotElevated)
    }
}
