// wire-pod installer
// Main library entry point

pub mod api;
pub mod config;
pub mod error;
pub mod installation;
pub mod models;
pub mod tui;
pub mod utils;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::sync::Arc;

use crate::api::installer::{run_install, InstallReport};
use crate::error::InstallFailure;
use crate::api::lifecycle::{start_pod_detached, stop_pod_if_running, uninstall};
use crate::api::release::fetch_latest_release_tag;
use crate::config::InstallerConfig;
use crate::error::{EXIT_FAILURE, EXIT_OK, EXIT_USAGE};
use crate::installation::elevation::{ElevationGuard, PrivilegeProbe};
use crate::installation::process::{ProcessTracker, StopOutcome};
use crate::installation::store::default_store;
use crate::models::settings::SettingsDraft;
use crate::models::state::InstallerContext;
use crate::tui::TuiOutcome;

/// Flags understood by `--unattended`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UnattendedArgs {
    pub install_dir: Option<String>,
    pub port: Option<String>,
    pub no_launch_on_login: bool,
    pub auto_update: bool,
    pub start: bool,
}

impl UnattendedArgs {
    pub fn parse(args: &[String]) -> Result<Self> {
        let mut parsed = UnattendedArgs::default();
        let mut iter = args.iter().skip(1);
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--unattended" => {}
                "--install-dir" => {
                    parsed.install_dir = Some(
                        iter.next()
                            .context("--install-dir requires a value")?
                            .clone(),
                    );
                }
                "--port" => {
                    parsed.port = Some(iter.next().context("--port requires a value")?.clone());
                }
                "--no-launch-on-login" => parsed.no_launch_on_login = true,
                "--auto-update" => parsed.auto_update = true,
                "--start" => parsed.start = true,
                other => {
                    if let Some(v) = other.strip_prefix("--install-dir=") {
                        parsed.install_dir = Some(v.to_string());
                    } else if let Some(v) = other.strip_prefix("--port=") {
                        parsed.port = Some(v.to_string());
                    } else {
                        anyhow::bail!("Unknown argument for --unattended: {}", other);
                    }
                }
            }
        }
        Ok(parsed)
    }

    /// Overlay the flags onto the configured defaults.
    pub fn to_draft(&self, config: &InstallerConfig) -> SettingsDraft {
        let mut draft = SettingsDraft::from_config(config);
        if let Some(dir) = &self.install_dir {
            draft.install_path = dir.clone();
        }
        if let Some(port) = &self.port {
            draft.web_port = port.clone();
        }
        draft.launch_on_login = !self.no_launch_on_login;
        draft.auto_update = self.auto_update;
        draft
    }
}

/// Initialize logging into the configured log folder. Failures are reported on stderr only.
fn init_logging(config: &InstallerConfig, with_stdout: bool) {
    let result = utils::path_resolver::resolve_log_folder(config)
        .and_then(|dir| utils::logging::init_logging(&dir, with_stdout));
    if let Err(e) = result {
        eprintln!("Failed to initialize logging: {}", e);
    }
}

fn load_config() -> Result<InstallerConfig> {
    InstallerConfig::load().context("Failed to load installer configuration")
}

fn build_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")
}

/// `true` when the process may write machine-wide state. Prints the reason otherwise.
fn check_elevation(config: &InstallerConfig) -> bool {
    let guard = ElevationGuard::from_config(config);
    if guard.is_elevated() {
        return true;
    }
    warn!("[PHASE: preflight] [STEP: elevation] Not elevated; exiting without changes");
    eprintln!("wire-pod installer: this program must be run as administrator (or with sudo).");
    false
}

fn lookup_release(rt: &tokio::runtime::Runtime, config: &InstallerConfig) -> Option<String> {
    match rt.block_on(fetch_latest_release_tag(config)) {
        Ok(tag) => Some(tag),
        Err(e) => {
            error!(
                "[PHASE: preflight] [STEP: release] Could not determine latest release: {:?}",
                e
            );
            eprintln!("Error getting latest wire-pod release from GitHub: {}", e);
            None
        }
    }
}

/// Exit code for a finished install run: 0 when it completed, 1 when it failed and was rolled
/// back.
pub fn exit_code_for(result: &std::result::Result<InstallReport, InstallFailure>) -> i32 {
    match result {
        Ok(_) => EXIT_OK,
        Err(_) => EXIT_FAILURE,
    }
}

fn start_after_install(config: &InstallerConfig, report: &InstallReport) -> i32 {
    let tracker = ProcessTracker::from_config(config);
    match start_pod_detached(&tracker, &report.service_executable) {
        Ok(pid) => {
            info!(
                "[PHASE: finalize] [STEP: start] wire-pod started detached (pid={})",
                pid
            );
            EXIT_OK
        }
        Err(e) => {
            error!("[PHASE: finalize] [STEP: start] Failed to start wire-pod: {}", e);
            eprintln!("wire-pod was installed but could not be started: {}", e);
            EXIT_FAILURE
        }
    }
}

/// Interactive wizard. Returns the process exit code.
pub fn run_tui() -> i32 {
    let config = match load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Installer error: {:#}", e);
            return EXIT_FAILURE;
        }
    };

    // No stdout chain; it would corrupt the terminal UI.
    init_logging(&config, false);
    info!(
        "[PHASE: initialization] Headless TUI installer starting at {} (session={})",
        chrono::Utc::now(),
        uuid::Uuid::new_v4()
    );

    if !check_elevation(&config) {
        return EXIT_OK;
    }

    let rt = match build_runtime() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Installer error: {:#}", e);
            return EXIT_FAILURE;
        }
    };
    let tag = match lookup_release(&rt, &config) {
        Some(tag) => tag,
        None => return EXIT_OK,
    };
    drop(rt);

    let ctx = Arc::new(InstallerContext::new(config, tag));
    match tui::run(Arc::clone(&ctx)) {
        Ok(TuiOutcome::Cancelled) => {
            info!("[PHASE: tui] [STEP: exit] Wizard cancelled");
            EXIT_OK
        }
        Ok(TuiOutcome::Installed {
            report,
            start_after_exit,
        }) => {
            info!(
                "[PHASE: tui] [STEP: exit] Installed {} to {:?} (start_after_exit={})",
                report.release_tag, report.install_path, start_after_exit
            );
            if start_after_exit {
                start_after_install(ctx.config(), &report)
            } else {
                EXIT_OK
            }
        }
        Ok(TuiOutcome::Failed { message }) => {
            error!("[PHASE: tui] [STEP: exit] Install failed: {}", message);
            eprintln!("{}", message);
            EXIT_FAILURE
        }
        Err(e) => {
            error!("[PHASE: tui] [STEP: fatal] TUI exited with error: {:?}", e);
            eprintln!("Installer error: {}", e);
            EXIT_FAILURE
        }
    }
}

/// Non-interactive install driven by command-line flags.
pub fn run_unattended(args: &[String]) -> i32 {
    let parsed = match UnattendedArgs::parse(args) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!(
                "Usage: wirepod-installer --unattended [--install-dir DIR] [--port PORT] [--no-launch-on-login] [--auto-update] [--start]"
            );
            return EXIT_USAGE;
        }
    };

    let config = match load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Installer error: {:#}", e);
            return EXIT_FAILURE;
        }
    };
    init_logging(&config, false);
    info!(
        "[PHASE: initialization] Unattended installer starting at {} ({:?})",
        chrono::Utc::now(),
        parsed
    );

    let settings = match parsed.to_draft(&config).freeze() {
        Ok(s) => s,
        Err(e) => {
            warn!("[PHASE: preferences] [STEP: validate] {}", e);
            eprintln!("{}", e);
            return EXIT_USAGE;
        }
    };

    if !check_elevation(&config) {
        return EXIT_OK;
    }

    let rt = match build_runtime() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Installer error: {:#}", e);
            return EXIT_FAILURE;
        }
    };
    let tag = match lookup_release(&rt, &config) {
        Some(tag) => tag,
        None => return EXIT_OK,
    };

    let ctx = Arc::new(InstallerContext::new(config, tag));
    let bar = ProgressBar::new(100);
    let style = ProgressStyle::with_template("{spinner} [{bar:40}] {pos:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    bar.set_style(style);

    let result = rt.block_on(async {
        let percent_task = {
            let mut rx = ctx.progress().subscribe_percent();
            let bar = bar.clone();
            tokio::spawn(async move {
                while rx.changed().await.is_ok() {
                    let p = *rx.borrow_and_update();
                    bar.set_position(p.round() as u64);
                }
            })
        };
        let status_task = {
            let mut rx = ctx.progress().subscribe_status();
            let bar = bar.clone();
            tokio::spawn(async move {
                while rx.changed().await.is_ok() {
                    let s = rx.borrow_and_update().clone();
                    bar.set_message(s);
                }
            })
        };

        let result = run_install(&ctx, &settings).await;
        percent_task.abort();
        status_task.abort();
        result
    });

    match &result {
        Ok(report) => {
            bar.finish_with_message("Done!");
            println!(
                "wire-pod {} installed to {} (run {}, {:.1?})",
                report.release_tag,
                report.install_path.display(),
                report.run_id,
                report.duration
            );
            if parsed.start {
                return start_after_install(ctx.config(), report);
            }
        }
        Err(e) => {
            bar.abandon_with_message("Installation failed. Changes were reverted.");
            eprintln!("Error installing wire-pod: {}", e);
        }
    }
    exit_code_for(&result)
}

/// Stop the tracked instance, or clear auto-start when nothing is tracked.
pub fn run_stop() -> i32 {
    let config = match load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Installer error: {:#}", e);
            return EXIT_FAILURE;
        }
    };
    init_logging(&config, true);
    if !check_elevation(&config) {
        return EXIT_OK;
    }

    let rt = match build_runtime() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Installer error: {:#}", e);
            return EXIT_FAILURE;
        }
    };
    let tracker = ProcessTracker::from_config(&config);
    let store = default_store(&config);
    match rt.block_on(stop_pod_if_running(&tracker, store.as_ref())) {
        Ok(StopOutcome::Stopped { pid }) => {
            println!("wire-pod stopped (pid {}).", pid);
            EXIT_OK
        }
        Ok(StopOutcome::NotRunning) => {
            println!("wire-pod is not running; auto-start registration cleared.");
            EXIT_OK
        }
        Err(e) => {
            error!("[PHASE: lifecycle] [STEP: stop] {}", e);
            eprintln!("Failed to stop wire-pod: {}", e);
            EXIT_FAILURE
        }
    }
}

pub fn run_uninstall(keep_files: bool) -> i32 {
    let config = match load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Installer error: {:#}", e);
            return EXIT_FAILURE;
        }
    };
    init_logging(&config, true);
    if !check_elevation(&config) {
        return EXIT_OK;
    }

    let result: Result<_> = build_runtime().and_then(|rt| {
        let tracker = ProcessTracker::from_config(&config);
        let store = default_store(&config);
        rt.block_on(uninstall(&tracker, store.as_ref(), keep_files))
    });
    match result {
        Ok(report) => {
            let location = report
                .install_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<not recorded>".to_string());
            println!(
                "wire-pod uninstalled (install path {}, {} files removed).",
                location, report.files_removed
            );
            if report.install_path.is_some() && !keep_files && !report.directory_removed {
                println!("The install directory was kept; it holds files wire-pod did not install.");
            }
            EXIT_OK
        }
        Err(e) => {
            error!("[PHASE: uninstall] [STEP: fatal] {:?}", e);
            eprintln!("Failed to uninstall wire-pod: {:#}", e);
            EXIT_FAILURE
        }
    }
}

/// Print the effective configuration as TOML.
pub fn print_config() -> i32 {
    match load_config().and_then(|c| c.to_toml()) {
        Ok(text) => {
            print!("{}", text);
            EXIT_OK
        }
        Err(e) => {
            eprintln!("Installer error: {:#}", e);
            EXIT_FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("wirepod-installer")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn unattended_args_parse_all_flags() {
        let parsed = UnattendedArgs::parse(&args(&[
            "--unattended",
            "--install-dir",
            "/srv/wire-pod",
            "--port=9090",
            "--no-launch-on-login",
            "--auto-update",
            "--start",
        ]))
        .unwrap();
        assert_eq!(parsed.install_dir.as_deref(), Some("/srv/wire-pod"));
        assert_eq!(parsed.port.as_deref(), Some("9090"));
        assert!(parsed.no_launch_on_login);
        assert!(parsed.auto_update);
        assert!(parsed.start);
    }

    #[test]
    fn exit_code_is_zero_only_for_a_completed_install() {
        let ok: std::result::Result<InstallReport, InstallFailure> = Ok(InstallReport {
            run_id: uuid::Uuid::new_v4(),
            release_tag: "v1.0.0".to_string(),
            install_path: "/opt/wire-pod".into(),
            service_executable: "/opt/wire-pod/chipper/chipper".into(),
            stopped_pid: None,
            autostart_registered: true,
            duration: std::time::Duration::from_secs(3),
        });
        assert_eq!(exit_code_for(&ok), EXIT_OK);

        let failed: std::result::Result<InstallReport, InstallFailure> = Err(InstallFailure {
            phase: crate::error::InstallPhase::Fetching,
            source: crate::error::PrivilegeError::NotElevated.into(),
        });
        assert_eq!(exit_code_for(&failed), EXIT_FAILURE);
        assert_ne!(EXIT_FAILURE, EXIT_OK);
    }

    /// Configuration with every machine-wide location redirected under `root`.
    #[cfg(not(windows))]
    fn sandboxed_config(root: &std::path::Path, artifact_url: String) -> InstallerConfig {
        InstallerConfig {
            artifact_url: Some(artifact_url),
            state_dir: root.join("state"),
            autostart_dir: root.join("autostart"),
            elevation_probe_dir: root.to_path_buf(),
            marker_file_name: format!("wirepod-test-{}", uuid::Uuid::new_v4().simple()),
            http_timeout_secs: 5,
            ..InstallerConfig::default()
        }
    }

    #[cfg(not(windows))]
    #[tokio::test]
    async fn failed_install_exits_non_zero_and_leaves_no_marker() {
        use crate::installation::fetch::test_support::serve;
        use crate::installation::store::{FileStateStore, StateStore};

        let base = serve("404 Not Found", b"missing".to_vec()).await;
        let dir = tempfile::tempdir().unwrap();
        let config = sandboxed_config(dir.path(), format!("{}/wire-pod.zip", base));
        let store = FileStateStore::from_config(&config);
        let ctx = InstallerContext::new(config, "v1.0.0");
        let settings = UnattendedArgs {
            install_dir: Some(dir.path().join("wire-pod").to_string_lossy().to_string()),
            ..UnattendedArgs::default()
        }
        .to_draft(ctx.config())
        .freeze()
        .unwrap();

        let result = run_install(&ctx, &settings).await;

        assert!(result.is_err());
        assert_eq!(exit_code_for(&result), EXIT_FAILURE);
        assert!(store.read_installation().unwrap().is_none());
        assert!(!store.autostart_registered().unwrap());
    }

    #[cfg(not(windows))]
    #[tokio::test]
    async fn completed_install_exits_zero() {
        use crate::installation::fetch::test_support::{sample_zip, serve};
        use crate::installation::store::{FileStateStore, StateStore};

        let base = serve("200 OK", sample_zip()).await;
        let dir = tempfile::tempdir().unwrap();
        let config = sandboxed_config(dir.path(), format!("{}/wire-pod.zip", base));
        let store = FileStateStore::from_config(&config);
        let ctx = InstallerContext::new(config, "v1.0.0");
        let settings = UnattendedArgs {
            install_dir: Some(dir.path().join("wire-pod").to_string_lossy().to_string()),
            ..UnattendedArgs::default()
        }
        .to_draft(ctx.config())
        .freeze()
        .unwrap();

        let result = run_install(&ctx, &settings).await;

        assert_eq!(exit_code_for(&result), EXIT_OK);
        assert!(store.read_installation().unwrap().is_some());
        assert!(store.autostart_registered().unwrap());
    }

    #[test]
    fn unattended_args_reject_unknown_and_missing_values() {
        assert!(UnattendedArgs::parse(&args(&["--unattended", "--bogus"])).is_err());
        assert!(UnattendedArgs::parse(&args(&["--unattended", "--port"])).is_err());
    }

    #[test]
    fn unattended_draft_overlays_config_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = InstallerConfig::default();
        let parsed = UnattendedArgs {
            install_dir: Some(dir.path().join("wire-pod").to_string_lossy().to_string()),
            no_launch_on_login: true,
            ..UnattendedArgs::default()
        };
        let draft = parsed.to_draft(&cfg);
        assert!(!draft.launch_on_login);
        assert_eq!(draft.web_port, cfg.default_web_port);

        let settings = draft.freeze().unwrap();
        assert_eq!(settings.install_path(), dir.path().join("wire-pod"));
    }
}
