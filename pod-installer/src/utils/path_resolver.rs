use anyhow::Result;
use std::path::PathBuf;

use crate::config::InstallerConfig;

/// Resolve deployment folder (absolute path)
pub fn resolve_deployment_folder() -> PathBuf {
    // Prefer the folder where the EXE is running from
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(dir) = exe_path.parent() {
            return dir.to_path_buf();
        }
    }

    // Fallback: current working directory
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Resolve log folder (absolute path), creating it if needed.
///
/// Uses `log_dir` from the configuration when set, else `<temp>/wire-pod-installer/logs`.
pub fn resolve_log_folder(config: &InstallerConfig) -> Result<PathBuf> {
    let log_dir = match &config.log_dir {
        Some(dir) => dir.clone(),
        None => std::env::temp_dir().join("wire-pod-installer").join("logs"),
    };
    std::fs::create_dir_all(&log_dir)
        .map_err(|e| anyhow::anyhow!("Failed to create log folder {:?}: {}", log_dir, e))?;
    Ok(log_dir)
}
