// Error taxonomy for the installer core.
//
// Validation errors stay at the preferences boundary. Everything raised at or after the
// fetching phase escalates to the orchestrator's single rollback handler.

use std::path::PathBuf;
use thiserror::Error;

/// Exit code for a normal run, a declined elevation, or a failed release lookup.
pub const EXIT_OK: i32 = 0;
/// Exit code after a failed install (rollback performed) or a fatal stop/uninstall.
pub const EXIT_FAILURE: i32 = 1;
/// Exit code for unusable command-line arguments.
pub const EXIT_USAGE: i32 = 2;

#[derive(Debug, Error)]
pub enum PrivilegeError {
    #[error("the installer must be run with administrator privileges")]
    NotElevated,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("The directory you have provided ({0}) is invalid. Please provide a valid path or use the default one.")]
    InstallDirectory(String),
    #[error("The web port you have provided ({0}) is invalid. It must be an integer between 1000-65353.")]
    WebPort(String),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error while downloading {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("download of {url} failed with HTTP status {status}")]
    Http { url: String, status: u16 },
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt archive: {0}")]
    CorruptArchive(String),
    #[error("extraction worker failed: {0}")]
    Worker(String),
    #[error("failed to initialise the HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("state document at {path:?} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("registry operation '{operation}' failed: {source}")]
    Registry {
        operation: String,
        #[source]
        source: std::io::Error,
    },
    #[error("installation state is inconsistent: marker present but '{0}' is missing")]
    Inconsistent(String),
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to write marker file {path:?}: {source}")]
    Marker {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to spawn {program:?}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("process {pid} did not exit after termination and force kill")]
    Unresponsive { pid: u32 },
}

/// Phases of an install run, in order. `RollingBack` and `Failed` are the error edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPhase {
    CollectingPreferences,
    Fetching,
    Configuring,
    Finalizing,
    Done,
    RollingBack,
    Failed,
}

impl InstallPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallPhase::CollectingPreferences => "collecting_preferences",
            InstallPhase::Fetching => "fetching",
            InstallPhase::Configuring => "configuring",
            InstallPhase::Finalizing => "finalizing",
            InstallPhase::Done => "done",
            InstallPhase::RollingBack => "rolling_back",
            InstallPhase::Failed => "failed",
        }
    }
}

impl std::fmt::Display for InstallPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum InstallError {
    #[error(transparent)]
    Privilege(#[from] PrivilegeError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// An install run that failed in `phase` and was rolled back.
#[derive(Debug, Error)]
#[error("installation failed during {phase}: {source}")]
pub struct InstallFailure {
    pub phase: InstallPhase,
    #[source]
    pub source: InstallError,
}
