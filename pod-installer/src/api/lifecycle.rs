// Stop / uninstall / start entry points
//
// Stop is dual-path: terminate the instance recorded in the marker file, or, when there is no
// valid record, clear the login auto-start registration so a stale install cannot come back on
// the next login. Both paths are safe to repeat.

use anyhow::{Context, Result};
use log::{info, warn};
use std::path::{Path, PathBuf};

use crate::error::{ProcessError, StoreError};
use crate::installation::files::{remove_install_dir, RemovalSummary};
use crate::installation::process::{spawn_detached, ProcessTracker, StopOutcome};
use crate::installation::store::{StateStore, KEY_INSTALL_PATH};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UninstallReport {
    pub stopped_pid: Option<u32>,
    pub install_path: Option<PathBuf>,
    pub files_removed: usize,
    /// False when the directory was kept because it holds files wire-pod did not install.
    pub directory_removed: bool,
}

pub async fn stop_pod_if_running(
    tracker: &ProcessTracker,
    store: &dyn StateStore,
) -> Result<StopOutcome, ProcessError> {
    info!("[PHASE: lifecycle] [STEP: stop] stop_pod_if_running entered");
    let outcome = tracker.stop_if_running(store).await?;
    match outcome {
        StopOutcome::Stopped { pid } => {
            info!("[PHASE: lifecycle] [STEP: stop] wire-pod stopped (pid={})", pid)
        }
        StopOutcome::NotRunning => info!(
            "[PHASE: lifecycle] [STEP: stop] No running instance; auto-start registration cleared"
        ),
    }
    Ok(outcome)
}

/// Start the installed service in its own process group and record its pid. The process is not
/// supervised afterwards.
pub fn start_pod_detached(tracker: &ProcessTracker, executable: &Path) -> Result<u32, ProcessError> {
    let cwd = executable.parent().unwrap_or_else(|| Path::new("."));
    let pid = spawn_detached(executable, cwd)?;
    if let Err(e) = tracker.record_running(pid) {
        warn!(
            "[PHASE: lifecycle] [STEP: start] Started pid {} but could not record it: {}",
            pid, e
        );
    }
    Ok(pid)
}

/// Stop the service, erase every persisted key and, unless `keep_files`, delete the files the
/// installer extracted. Anything else in the install directory is kept. An unresponsive instance
/// aborts before anything is erased.
pub async fn uninstall(
    tracker: &ProcessTracker,
    store: &dyn StateStore,
    keep_files: bool,
) -> Result<UninstallReport> {
    info!(
        "[PHASE: uninstall] [STEP: start] uninstall entered (keep_files={})",
        keep_files
    );

    let stopped_pid = match stop_pod_if_running(tracker, store)
        .await
        .context("Failed to stop wire-pod; nothing was uninstalled")?
    {
        StopOutcome::Stopped { pid } => Some(pid),
        StopOutcome::NotRunning => None,
    };

    let install_path = recorded_install_path(store);

    if let Err(e) = store.erase_all() {
        warn!(
            "[PHASE: uninstall] [STEP: erase_all] Failed to erase persistent state: {}",
            e
        );
    }

    let removal = match (&install_path, keep_files) {
        (Some(path), false) => remove_install_dir(path)
            .await
            .with_context(|| format!("Failed to remove install directory {:?}", path))?,
        _ => RemovalSummary::default(),
    };

    info!(
        "[PHASE: uninstall] [STEP: complete] uninstall exit (stopped_pid={:?}, install_path={:?}, files_removed={}, directory_removed={})",
        stopped_pid, install_path, removal.files_removed, removal.directory_removed
    );
    Ok(UninstallReport {
        stopped_pid,
        install_path,
        files_removed: removal.files_removed,
        directory_removed: removal.directory_removed,
    })
}

/// Install path from the store, tolerating an inconsistent record so a half-written install can
/// still be removed.
fn recorded_install_path(store: &dyn StateStore) -> Option<PathBuf> {
    match store.read_installation() {
        Ok(Some(state)) => Some(state.install_path),
        Ok(None) => None,
        Err(StoreError::Inconsistent(key)) => {
            warn!(
                "[PHASE: uninstall] [STEP: read_state] Installation record is inconsistent (missing {}); using what is there",
                key
            );
            store
                .read_all()
                .ok()
                .and_then(|entries| {
                    entries
                        .get(KEY_INSTALL_PATH)
                        .and_then(|v| v.as_text())
                        .map(PathBuf::from)
                })
        }
        Err(e) => {
            warn!(
                "[PHASE: uninstall] [STEP: read_state] Could not read installation record: {}",
                e
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installation::files::{write_install_manifest, INSTALL_MANIFEST};
    use crate::installation::store::testing::MemoryStateStore;
    use crate::installation::store::{entries_for, StoreEntries, StoreValue, KEY_INSTALLED_MARKER};
    use crate::models::settings::SettingsDraft;
    use std::time::Duration;

    fn tracker_in(dir: &Path, expected: &str) -> ProcessTracker {
        ProcessTracker::new(
            dir.join("wirepodrunningPID"),
            expected,
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
    }

    fn installed_store(install_path: &Path) -> MemoryStateStore {
        let settings = SettingsDraft {
            launch_on_login: true,
            auto_update: false,
            install_path: install_path.to_string_lossy().to_string(),
            web_port: "8080".to_string(),
        }
        .freeze()
        .unwrap();
        let store = MemoryStateStore::new();
        store.seed(
            entries_for(&settings),
            Some(install_path.join("chipper/chipper")),
        );
        store
    }

    /// Lay down `chipper/chipper` the way an extracted release would, manifest included.
    fn extract_release(install: &Path) {
        std::fs::create_dir_all(install.join("chipper")).unwrap();
        std::fs::write(install.join("chipper/chipper"), b"bin").unwrap();
        write_install_manifest(install, &[PathBuf::from("chipper/chipper")]).unwrap();
    }

    #[tokio::test]
    async fn stop_twice_is_a_noop_success() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = tracker_in(dir.path(), "chipper");
        let store = installed_store(&dir.path().join("wire-pod"));

        let first = stop_pod_if_running(&tracker, &store).await.unwrap();
        let second = stop_pod_if_running(&tracker, &store).await.unwrap();

        assert_eq!(first, StopOutcome::NotRunning);
        assert_eq!(second, StopOutcome::NotRunning);
        assert!(!store.autostart_registered().unwrap());
        assert!(!tracker.is_running());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stop_terminates_instance_started_detached() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("sleep-forever.sh");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        let tracker = tracker_in(dir.path(), "sleep");
        let store = MemoryStateStore::new();

        let pid = start_pod_detached(&tracker, &script).unwrap();
        assert_eq!(tracker.recorded_pid(), Some(pid));

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !tracker.is_running() && std::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(tracker.is_running());

        let outcome = stop_pod_if_running(&tracker, &store).await.unwrap();
        assert_eq!(outcome, StopOutcome::Stopped { pid });
        assert!(!tracker.is_running());
    }

    #[tokio::test]
    async fn uninstall_erases_state_and_removes_files() {
        let dir = tempfile::tempdir().unwrap();
        let install = dir.path().join("wire-pod");
        extract_release(&install);
        let tracker = tracker_in(dir.path(), "chipper");
        let store = installed_store(&install);

        let report = uninstall(&tracker, &store, false).await.unwrap();

        assert_eq!(report.install_path, Some(install.clone()));
        assert_eq!(report.files_removed, 1);
        assert!(report.directory_removed);
        assert!(!install.exists());
        assert!(store.read_all().unwrap().is_empty());
        assert!(!store.autostart_registered().unwrap());

        let again = uninstall(&tracker, &store, false).await.unwrap();
        assert_eq!(again.install_path, None);
        assert_eq!(again.files_removed, 0);
    }

    #[tokio::test]
    async fn uninstall_keeps_user_files_in_a_shared_directory() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().join("home-user");
        std::fs::create_dir_all(&home).unwrap();
        std::fs::write(home.join("thesis.docx"), b"years of work").unwrap();
        extract_release(&home);
        let tracker = tracker_in(dir.path(), "chipper");
        let store = installed_store(&home);

        let report = uninstall(&tracker, &store, false).await.unwrap();

        assert_eq!(report.files_removed, 1);
        assert!(!report.directory_removed);
        assert!(home.join("thesis.docx").is_file());
        assert!(!home.join("chipper").exists());
        assert!(!home.join(INSTALL_MANIFEST).exists());
        assert!(store.read_installation().unwrap().is_none());
    }

    #[tokio::test]
    async fn uninstall_leaves_directory_without_manifest_alone() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().join("home-user");
        std::fs::create_dir_all(&home).unwrap();
        std::fs::write(home.join("thesis.docx"), b"years of work").unwrap();
        let tracker = tracker_in(dir.path(), "chipper");
        let store = installed_store(&home);

        let report = uninstall(&tracker, &store, false).await.unwrap();

        assert_eq!(report.files_removed, 0);
        assert!(!report.directory_removed);
        assert!(home.join("thesis.docx").is_file());
    }

    #[tokio::test]
    async fn uninstall_keep_files_leaves_directory() {
        let dir = tempfile::tempdir().unwrap();
        let install = dir.path().join("wire-pod");
        extract_release(&install);
        std::fs::write(install.join("apiConfig.json"), b"{}").unwrap();
        let tracker = tracker_in(dir.path(), "chipper");
        let store = installed_store(&install);

        let report = uninstall(&tracker, &store, true).await.unwrap();
        assert_eq!(report.files_removed, 0);
        assert!(install.join("apiConfig.json").exists());
        assert!(install.join("chipper/chipper").exists());
        assert!(store.read_installation().unwrap().is_none());
    }

    #[tokio::test]
    async fn uninstall_tolerates_inconsistent_record() {
        let dir = tempfile::tempdir().unwrap();
        let install = dir.path().join("wire-pod");
        extract_release(&install);
        let tracker = tracker_in(dir.path(), "chipper");
        let store = MemoryStateStore::new();
        let mut entries = StoreEntries::new();
        entries.insert(
            KEY_INSTALL_PATH.to_string(),
            StoreValue::Text(install.to_string_lossy().to_string()),
        );
        entries.insert(
            KEY_INSTALLED_MARKER.to_string(),
            StoreValue::Text("2026-01-01T00:00:00Z".to_string()),
        );
        store.seed(entries, None);

        let report = uninstall(&tracker, &store, false).await.unwrap();
        assert_eq!(report.install_path, Some(install.clone()));
        assert!(!install.exists());
    }
}
