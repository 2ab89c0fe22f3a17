//! Process tracker for the pod service.
//!
//! The running instance is recorded as a decimal pid in a marker file in the temp directory.
//! The marker is never trusted on presence alone: a pid only counts as the tracked service when
//! a live process with that pid runs the expected executable.

use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessStatus, Signal, System};

use crate::config::InstallerConfig;
use crate::error::ProcessError;
use crate::installation::store::StateStore;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// A tracked instance was running and has exited.
    Stopped { pid: u32 },
    /// No valid record; the auto-start fallback was applied.
    NotRunning,
}

#[derive(Debug, Clone)]
pub struct ProcessTracker {
    marker_path: PathBuf,
    expected_name: String,
    stop_timeout: Duration,
    kill_timeout: Duration,
}

impl ProcessTracker {
    pub fn new(
        marker_path: impl Into<PathBuf>,
        expected_name: impl Into<String>,
        stop_timeout: Duration,
        kill_timeout: Duration,
    ) -> Self {
        Self {
            marker_path: marker_path.into(),
            expected_name: expected_name.into(),
            stop_timeout,
            kill_timeout,
        }
    }

    pub fn from_config(config: &InstallerConfig) -> Self {
        let expected = config
            .service_executable
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self::new(
            config.marker_path(),
            expected,
            config.stop_timeout(),
            config.kill_timeout(),
        )
    }

    pub fn marker_path(&self) -> &Path {
        &self.marker_path
    }

    pub fn record_running(&self, pid: u32) -> Result<(), ProcessError> {
        std::fs::write(&self.marker_path, pid.to_string()).map_err(|e| ProcessError::Marker {
            path: self.marker_path.clone(),
            source: e,
        })?;
        info!(
            "[PHASE: lifecycle] [STEP: marker] Recorded running instance (pid={}, marker={:?})",
            pid, self.marker_path
        );
        Ok(())
    }

    /// The pid in the marker file, if the file exists and parses.
    pub fn recorded_pid(&self) -> Option<u32> {
        let raw = std::fs::read_to_string(&self.marker_path).ok()?;
        raw.trim().parse::<u32>().ok()
    }

    pub fn is_running(&self) -> bool {
        match self.recorded_pid() {
            Some(pid) => self.is_tracked_alive(pid),
            None => false,
        }
    }

    pub fn clear_marker(&self) {
        match std::fs::remove_file(&self.marker_path) {
            Ok(()) => debug!(
                "[PHASE: lifecycle] [STEP: marker] Removed marker {:?}",
                self.marker_path
            ),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "[PHASE: lifecycle] [STEP: marker] Failed to remove marker {:?}: {}",
                self.marker_path, e
            ),
        }
    }

    /// Stop the tracked instance, or clear auto-start when there is none. Idempotent.
    pub async fn stop_if_running(
        &self,
        store: &dyn StateStore,
    ) -> Result<StopOutcome, ProcessError> {
        let pid = match self.recorded_pid() {
            Some(pid) if self.is_tracked_alive(pid) => pid,
            recorded => {
                if recorded.is_some() {
                    info!(
                        "[PHASE: lifecycle] [STEP: stop] Marker is stale (pid={:?}); discarding",
                        recorded
                    );
                }
                self.clear_marker();
                if let Err(e) = store.clear_autostart() {
                    warn!(
                        "[PHASE: lifecycle] [STEP: stop] Failed to clear auto-start registration: {}",
                        e
                    );
                }
                return Ok(StopOutcome::NotRunning);
            }
        };

        info!(
            "[PHASE: lifecycle] [STEP: stop] Stopping running instance (pid={}, stop_timeout_ms={}, kill_timeout_ms={})",
            pid,
            self.stop_timeout.as_millis(),
            self.kill_timeout.as_millis()
        );

        match send_signal(pid, Signal::Term) {
            Some(true) => {
                if self.wait_for_exit(pid, self.stop_timeout).await {
                    self.clear_marker();
                    info!(
                        "[PHASE: lifecycle] [STEP: stop] Instance exited after termination signal (pid={})",
                        pid
                    );
                    return Ok(StopOutcome::Stopped { pid });
                }
                warn!(
                    "[PHASE: lifecycle] [STEP: stop] Instance ignored termination for {}ms; force killing (pid={})",
                    self.stop_timeout.as_millis(),
                    pid
                );
            }
            Some(false) => warn!(
                "[PHASE: lifecycle] [STEP: stop] Termination signal was not delivered (pid={})",
                pid
            ),
            None => debug!(
                "[PHASE: lifecycle] [STEP: stop] Graceful termination unsupported here; force killing (pid={})",
                pid
            ),
        }

        send_signal(pid, Signal::Kill);
        if self.wait_for_exit(pid, self.kill_timeout).await {
            self.clear_marker();
            info!(
                "[PHASE: lifecycle] [STEP: stop] Instance exited after force kill (pid={})",
                pid
            );
            return Ok(StopOutcome::Stopped { pid });
        }

        Err(ProcessError::Unresponsive { pid })
    }

    async fn wait_for_exit(&self, pid: u32, limit: Duration) -> bool {
        let started = Instant::now();
        loop {
            if !self.is_tracked_alive(pid) {
                return true;
            }
            if started.elapsed() >= limit {
                return false;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    fn is_tracked_alive(&self, pid: u32) -> bool {
        let mut sys = System::new();
        let sys_pid = Pid::from_u32(pid);
        if !sys.refresh_process(sys_pid) {
            return false;
        }
        let Some(process) = sys.process(sys_pid) else {
            return false;
        };
        if matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead) {
            return false;
        }

        let exe_name = process
            .exe()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string());
        let matches = exe_name
            .as_deref()
            .map(|n| self.name_matches(n))
            .unwrap_or(false)
            || self.name_matches(process.name());
        if !matches {
            debug!(
                "[PHASE: lifecycle] [STEP: identity] pid {} belongs to another executable (name={}, exe={:?}, expected={})",
                pid,
                process.name(),
                exe_name,
                self.expected_name
            );
        }
        matches
    }

    fn name_matches(&self, candidate: &str) -> bool {
        if cfg!(windows) {
            candidate.eq_ignore_ascii_case(&self.expected_name)
        } else {
            candidate == self.expected_name
        }
    }
}

/// `None` when the platform cannot deliver `signal`.
fn send_signal(pid: u32, signal: Signal) -> Option<bool> {
    let mut sys = System::new();
    let sys_pid = Pid::from_u32(pid);
    if !sys.refresh_process(sys_pid) {
        return Some(false);
    }
    let process = sys.process(sys_pid)?;
    if signal == Signal::Kill {
        return Some(process.kill());
    }
    process.kill_with(signal)
}

/// Start `program` in its own process group without waiting for it. Returns the child's pid.
pub fn spawn_detached(program: &Path, cwd: &Path) -> Result<u32, ProcessError> {
    let mut cmd = Command::new(program);
    cmd.current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        use winapi::um::winbase::{CREATE_NEW_PROCESS_GROUP, DETACHED_PROCESS};
        cmd.creation_flags(CREATE_NEW_PROCESS_GROUP | DETACHED_PROCESS);
    }

    let child = cmd.spawn().map_err(|e| ProcessError::Spawn {
        program: program.to_path_buf(),
        source: e,
    })?;
    let pid = child.id();
    info!(
        "[PHASE: lifecycle] [STEP: spawn] Started detached process (program={:?}, cwd={:?}, pid={})",
        program, cwd, pid
    );
    Ok(pid)
}
