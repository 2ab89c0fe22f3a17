// Install orchestration
//
// Runs the install phases in order, publishing status text and percent onto the context's
// progress cells:
// - Fetching: elevation re-check, stop any tracked instance, download + unpack (0-100%)
// - Configuring: persist settings (marker last), optional login auto-start
// - Finalizing: final 100% and done
// Any failure in those phases erases persistent state (best-effort) and is returned as an
// `InstallFailure`; the caller decides how the program ends. The install directory is left as-is.

use log::{error, info};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::error::{InstallError, InstallFailure, InstallPhase};
use crate::installation::elevation::{require_elevated, ElevationGuard, PrivilegeProbe};
use crate::installation::fetch::{ArtifactFetcher, HttpArtifactFetcher};
use crate::installation::process::{ProcessTracker, StopOutcome};
use crate::installation::store::{default_store, entries_for, erase_all_best_effort, StateStore};
use crate::models::progress::MonotonicProgress;
use crate::models::settings::InstallSettings;
use crate::models::state::InstallerContext;

/// Summary of a completed install.
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub run_id: Uuid,
    pub release_tag: String,
    pub install_path: PathBuf,
    pub service_executable: PathBuf,
    pub stopped_pid: Option<u32>,
    pub autostart_registered: bool,
    pub duration: Duration,
}

pub struct InstallOrchestrator<'a> {
    ctx: &'a InstallerContext,
    probe: &'a dyn PrivilegeProbe,
    fetcher: &'a dyn ArtifactFetcher,
    store: &'a dyn StateStore,
    tracker: &'a ProcessTracker,
    phase: InstallPhase,
    run_id: Uuid,
}

impl<'a> InstallOrchestrator<'a> {
    pub fn new(
        ctx: &'a InstallerContext,
        probe: &'a dyn PrivilegeProbe,
        fetcher: &'a dyn ArtifactFetcher,
        store: &'a dyn StateStore,
        tracker: &'a ProcessTracker,
    ) -> Self {
        Self {
            ctx,
            probe,
            fetcher,
            store,
            tracker,
            phase: InstallPhase::CollectingPreferences,
            run_id: Uuid::new_v4(),
        }
    }

    pub fn phase(&self) -> InstallPhase {
        self.phase
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    fn enter(&mut self, phase: InstallPhase) {
        info!(
            "[PHASE: {}] [STEP: transition] Entering phase (run_id={}, from={})",
            phase, self.run_id, self.phase
        );
        self.phase = phase;
    }

    /// Run every phase for `settings`. Not re-entrant: a finished or failed orchestrator stays
    /// in its terminal phase.
    pub async fn run(&mut self, settings: &InstallSettings) -> Result<InstallReport, InstallFailure> {
        let started = Instant::now();
        info!(
            "[PHASE: {}] [STEP: start] Install run started (run_id={}, tag={}, install_path={:?}, web_port={}, launch_on_login={}, auto_update={})",
            self.phase,
            self.run_id,
            self.ctx.release_tag(),
            settings.install_path(),
            settings.web_port(),
            settings.launch_on_login(),
            settings.auto_update()
        );

        match self.run_phases(settings).await {
            Ok((stopped_pid, autostart_registered)) => {
                let report = InstallReport {
                    run_id: self.run_id,
                    release_tag: self.ctx.release_tag().to_string(),
                    install_path: settings.install_path().to_path_buf(),
                    service_executable: self.ctx.service_executable_in(settings.install_path()),
                    stopped_pid,
                    autostart_registered,
                    duration: started.elapsed(),
                };
                info!(
                    "[PHASE: done] [STEP: complete] Install run finished (run_id={}, duration_ms={})",
                    self.run_id,
                    report.duration.as_millis()
                );
                Ok(report)
            }
            Err(source) => {
                let failed_in = self.phase;
                error!(
                    "[PHASE: {}] [STEP: error] Install run failed (run_id={}): {}",
                    failed_in, self.run_id, source
                );
                self.roll_back();
                Err(InstallFailure {
                    phase: failed_in,
                    source,
                })
            }
        }
    }

    async fn run_phases(
        &mut self,
        settings: &InstallSettings,
    ) -> Result<(Option<u32>, bool), InstallError> {
        let ctx = self.ctx;
        let progress = ctx.progress();

        // Fetching
        self.enter(InstallPhase::Fetching);
        progress.publish_percent(0.0);
        progress.publish_status("Checking privileges...");
        require_elevated(self.probe)?;

        progress.publish_status("Stopping wire-pod if it is running...");
        let stopped_pid = match self.tracker.stop_if_running(self.store).await? {
            StopOutcome::Stopped { pid } => Some(pid),
            StopOutcome::NotRunning => None,
        };

        progress.publish_status(format!(
            "Downloading wire-pod {}...",
            self.ctx.release_tag()
        ));
        let url = self.ctx.artifact_url();
        let sink = progress.percent_sink();
        self.fetcher
            .fetch_and_unpack(&url, settings.install_path(), MonotonicProgress::new(sink))
            .await?;

        // Configuring
        self.enter(InstallPhase::Configuring);
        progress.publish_status("Configuring wire-pod...");
        self.store.write_all(&entries_for(settings))?;

        let autostart_registered = if settings.launch_on_login() {
            progress.publish_status("Registering wire-pod to start at login...");
            let exe = self.ctx.service_executable_in(settings.install_path());
            self.store.register_autostart(&exe)?;
            true
        } else {
            false
        };

        // Finalizing
        self.enter(InstallPhase::Finalizing);
        progress.publish_percent(100.0);
        progress.publish_status("Done!");
        self.enter(InstallPhase::Done);

        Ok((stopped_pid, autostart_registered))
    }

    fn roll_back(&mut self) {
        self.enter(InstallPhase::RollingBack);
        self.ctx
            .progress()
            .publish_status("Installation failed. Reverting changes...");
        erase_all_best_effort(self.store, &format!("install run {} failed", self.run_id));
        self.enter(InstallPhase::Failed);
    }
}

/// Run an install with the platform collaborators built from the context's configuration.
pub async fn run_install(
    ctx: &InstallerContext,
    settings: &InstallSettings,
) -> Result<InstallReport, InstallFailure> {
    let config = ctx.config();
    let fetcher = HttpArtifactFetcher::new(config.http_timeout()).map_err(|e| InstallFailure {
        phase: InstallPhase::Fetching,
        source: e.into(),
    })?;
    let probe = ElevationGuard::from_config(config);
    let store = default_store(config);
    let tracker = ProcessTracker::from_config(config);

    let mut orchestrator =
        InstallOrchestrator::new(ctx, &probe, &fetcher, store.as_ref(), &tracker);
    orchestrator.run(settings).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstallerConfig;
    use crate::error::{FetchError, PrivilegeError, StoreError};
    use crate::installation::fetch::test_support::{sample_zip, serve};
    use crate::installation::fetch::HttpArtifactFetcher;
    use crate::installation::store::testing::MemoryStateStore;
    use crate::installation::store::{KEY_INSTALLED_MARKER, MANAGED_KEYS};
    use crate::models::settings::SettingsDraft;
    use async_trait::async_trait;
    use std::path::Path;

    struct Elevated(bool);

    impl PrivilegeProbe for Elevated {
        fn is_elevated(&self) -> bool {
            self.0
        }
    }

    /// Writes a single file, or fails like a dropped connection.
    struct FakeFetcher {
        fail: bool,
    }

    #[async_trait]
    impl ArtifactFetcher for FakeFetcher {
        async fn fetch_and_unpack(
            &self,
            _url: &str,
            dest: &Path,
            on_progress: MonotonicProgress,
        ) -> Result<(), FetchError> {
            if self.fail {
                return Err(FetchError::Io {
                    path: dest.to_path_buf(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::ConnectionReset,
                        "simulated network failure",
                    ),
                });
            }
            std::fs::create_dir_all(dest.join("chipper")).unwrap();
            std::fs::write(dest.join("chipper/chipper"), b"bin").unwrap();
            on_progress.report(50.0);
            on_progress.report(100.0);
            Ok(())
        }
    }

    fn settings_in(parent: &Path, launch_on_login: bool) -> InstallSettings {
        SettingsDraft {
            launch_on_login,
            auto_update: false,
            install_path: parent.join("wire-pod").to_string_lossy().to_string(),
            web_port: "8080".to_string(),
        }
        .freeze()
        .unwrap()
    }

    fn tracker_in(dir: &Path) -> ProcessTracker {
        ProcessTracker::new(
            dir.join("wirepodrunningPID"),
            "chipper",
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
    }

    fn context() -> InstallerContext {
        InstallerContext::new(InstallerConfig::default(), "v1.0.0")
    }

    #[tokio::test]
    async fn successful_run_writes_all_keys_and_reaches_done() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context();
        let store = MemoryStateStore::new();
        let tracker = tracker_in(dir.path());
        let fetcher = FakeFetcher { fail: false };
        let settings = settings_in(dir.path(), true);

        let mut orch = InstallOrchestrator::new(&ctx, &Elevated(true), &fetcher, &store, &tracker);
        let report = orch.run(&settings).await.unwrap();

        assert_eq!(orch.phase(), InstallPhase::Done);
        assert_eq!(report.install_path, dir.path().join("wire-pod"));
        assert!(report.autostart_registered);
        assert_eq!(report.stopped_pid, None);

        let entries = store.read_all().unwrap();
        for key in MANAGED_KEYS {
            assert!(entries.contains_key(key), "missing {}", key);
        }
        let installed = store.read_installation().unwrap().unwrap();
        assert_eq!(installed.web_port, "8080");
        assert_eq!(
            store.autostart_target(),
            Some(ctx.service_executable_in(&dir.path().join("wire-pod")))
        );
        assert_eq!(ctx.progress().latest_percent(), 100.0);
        assert_eq!(ctx.progress().latest_status(), "Done!");
    }

    #[tokio::test]
    async fn launch_on_login_off_skips_autostart() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context();
        let store = MemoryStateStore::failing_autostart();
        let tracker = tracker_in(dir.path());
        let fetcher = FakeFetcher { fail: false };

        let mut orch = InstallOrchestrator::new(&ctx, &Elevated(true), &fetcher, &store, &tracker);
        let report = orch.run(&settings_in(dir.path(), false)).await.unwrap();
        assert!(!report.autostart_registered);
        assert!(!store.autostart_registered().unwrap());
    }

    #[tokio::test]
    async fn fetch_failure_rolls_back_and_leaves_no_marker() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context();
        let store = MemoryStateStore::new();
        let tracker = tracker_in(dir.path());
        let fetcher = FakeFetcher { fail: true };

        let mut orch = InstallOrchestrator::new(&ctx, &Elevated(true), &fetcher, &store, &tracker);
        let failure = orch.run(&settings_in(dir.path(), true)).await.unwrap_err();

        assert_eq!(failure.phase, InstallPhase::Fetching);
        assert!(matches!(failure.source, InstallError::Fetch(_)));
        assert_eq!(orch.phase(), InstallPhase::Failed);
        assert_eq!(store.erase_calls(), 1);
        assert!(!store.read_all().unwrap().contains_key(KEY_INSTALLED_MARKER));
    }

    #[tokio::test]
    async fn configuring_failure_leaves_no_partial_keys() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context();
        let store = MemoryStateStore::failing_write_after(2);
        let tracker = tracker_in(dir.path());
        let fetcher = FakeFetcher { fail: false };

        let mut orch = InstallOrchestrator::new(&ctx, &Elevated(true), &fetcher, &store, &tracker);
        let failure = orch.run(&settings_in(dir.path(), true)).await.unwrap_err();

        assert_eq!(failure.phase, InstallPhase::Configuring);
        assert!(matches!(
            failure.source,
            InstallError::Store(StoreError::Registry { .. })
        ));
        assert!(store.read_all().unwrap().is_empty());
        assert!(store.read_installation().unwrap().is_none());
        // Fetched files are not cleaned up on rollback.
        assert!(dir.path().join("wire-pod/chipper/chipper").exists());
    }

    #[tokio::test]
    async fn autostart_failure_rolls_back_written_keys() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context();
        let store = MemoryStateStore::failing_autostart();
        let tracker = tracker_in(dir.path());
        let fetcher = FakeFetcher { fail: false };

        let mut orch = InstallOrchestrator::new(&ctx, &Elevated(true), &fetcher, &store, &tracker);
        let failure = orch.run(&settings_in(dir.path(), true)).await.unwrap_err();

        assert_eq!(failure.phase, InstallPhase::Configuring);
        assert!(store.read_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn not_elevated_fails_before_any_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context();
        let store = MemoryStateStore::new();
        let tracker = tracker_in(dir.path());
        let fetcher = FakeFetcher { fail: false };

        let mut orch =
            InstallOrchestrator::new(&ctx, &Elevated(false), &fetcher, &store, &tracker);
        let failure = orch.run(&settings_in(dir.path(), true)).await.unwrap_err();

        assert!(matches!(
            failure.source,
            InstallError::Privilege(PrivilegeError::NotElevated)
        ));
        assert!(!dir.path().join("wire-pod").exists());
        assert!(store.read_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn end_to_end_over_http_with_real_fetcher() {
        let base = serve("200 OK", sample_zip()).await;
        let dir = tempfile::tempdir().unwrap();
        let config = InstallerConfig {
            artifact_url: Some(format!("{}/wire-pod-linux-amd64.zip", base)),
            ..InstallerConfig::default()
        };
        let ctx = InstallerContext::new(config, "v1.0.0");
        let store = MemoryStateStore::new();
        let tracker = tracker_in(dir.path());
        let fetcher = HttpArtifactFetcher::new(Duration::from_secs(5)).unwrap();

        let mut percents = ctx.progress().subscribe_percent();
        let mut orch = InstallOrchestrator::new(&ctx, &Elevated(true), &fetcher, &store, &tracker);
        let report = orch.run(&settings_in(dir.path(), false)).await.unwrap();

        assert!(report.install_path.join("chipper/chipper").is_file());
        assert!(store.read_installation().unwrap().is_some());
        assert_eq!(*percents.borrow_and_update(), 100.0);
    }
}
