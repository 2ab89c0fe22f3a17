//! Persistent state store.
//!
//! Machine-wide facts about the installation (location, port, login auto-start, installed
//! marker) live behind [`StateStore`]. Invariants every backend upholds:
//! - `installed_marker` is written last, so a marker never exists without its companion keys;
//! - `erase_all` is idempotent and removes every key plus the auto-start registration;
//! - only the install orchestrator and the lifecycle entry points mutate the store.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::InstallerConfig;
use crate::error::StoreError;
use crate::models::settings::InstallSettings;

pub const KEY_INSTALL_PATH: &str = "install_path";
pub const KEY_WEB_PORT: &str = "web_port";
pub const KEY_LAUNCH_ON_LOGIN: &str = "launch_on_login";
pub const KEY_AUTO_UPDATE: &str = "auto_update";
pub const KEY_INSTALLED_MARKER: &str = "installed_marker";

/// Every key this installer may write. Companion keys first, marker last.
pub const MANAGED_KEYS: [&str; 5] = [
    KEY_INSTALL_PATH,
    KEY_WEB_PORT,
    KEY_LAUNCH_ON_LOGIN,
    KEY_AUTO_UPDATE,
    KEY_INSTALLED_MARKER,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoreValue {
    Bool(bool),
    Text(String),
}

impl StoreValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            StoreValue::Text(s) => Some(s),
            StoreValue::Bool(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            StoreValue::Bool(b) => Some(*b),
            StoreValue::Text(_) => None,
        }
    }
}

pub type StoreEntries = BTreeMap<String, StoreValue>;

/// What a completed install left behind, as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledState {
    pub install_path: PathBuf,
    pub web_port: String,
    pub launch_on_login: bool,
    pub auto_update: bool,
    pub installed_at: String,
}

pub trait StateStore: Send + Sync {
    /// Write every entry. Any error must be treated by the caller as total failure.
    fn write_all(&self, entries: &StoreEntries) -> Result<(), StoreError>;

    /// Remove every managed key and the auto-start registration. Idempotent.
    fn erase_all(&self) -> Result<(), StoreError>;

    fn read_all(&self) -> Result<StoreEntries, StoreError>;

    /// Register `executable` to start at user login.
    fn register_autostart(&self, executable: &Path) -> Result<(), StoreError>;

    /// Remove the auto-start registration. Succeeds when none exists.
    fn clear_autostart(&self) -> Result<(), StoreError>;

    fn autostart_registered(&self) -> Result<bool, StoreError>;

    /// `None` unless the installed marker is present; the marker without a companion key is
    /// reported as `StoreError::Inconsistent`.
    fn read_installation(&self) -> Result<Option<InstalledState>, StoreError> {
        let entries = self.read_all()?;
        installed_state_from(&entries)
    }
}

pub fn installed_state_from(entries: &StoreEntries) -> Result<Option<InstalledState>, StoreError> {
    let Some(marker) = entries.get(KEY_INSTALLED_MARKER) else {
        return Ok(None);
    };

    let text = |key: &str| -> Result<String, StoreError> {
        entries
            .get(key)
            .and_then(StoreValue::as_text)
            .map(str::to_string)
            .ok_or_else(|| StoreError::Inconsistent(key.to_string()))
    };
    let flag = |key: &str| -> Result<bool, StoreError> {
        entries
            .get(key)
            .and_then(StoreValue::as_bool)
            .ok_or_else(|| StoreError::Inconsistent(key.to_string()))
    };

    Ok(Some(InstalledState {
        install_path: PathBuf::from(text(KEY_INSTALL_PATH)?),
        web_port: text(KEY_WEB_PORT)?,
        launch_on_login: flag(KEY_LAUNCH_ON_LOGIN)?,
        auto_update: flag(KEY_AUTO_UPDATE)?,
        installed_at: marker
            .as_text()
            .map(str::to_string)
            .unwrap_or_default(),
    }))
}

/// The batch written at the end of a successful install, marker included.
pub fn entries_for(settings: &InstallSettings) -> StoreEntries {
    let mut entries = StoreEntries::new();
    entries.insert(
        KEY_INSTALL_PATH.to_string(),
        StoreValue::Text(settings.install_path().to_string_lossy().to_string()),
    );
    entries.insert(
        KEY_WEB_PORT.to_string(),
        StoreValue::Text(settings.web_port().to_string()),
    );
    entries.insert(
        KEY_LAUNCH_ON_LOGIN.to_string(),
        StoreValue::Bool(settings.launch_on_login()),
    );
    entries.insert(
        KEY_AUTO_UPDATE.to_string(),
        StoreValue::Bool(settings.auto_update()),
    );
    entries.insert(
        KEY_INSTALLED_MARKER.to_string(),
        StoreValue::Text(chrono::Utc::now().to_rfc3339()),
    );
    entries
}

/// Entries in write order: managed keys in `MANAGED_KEYS` order (marker last), then any others.
pub fn ordered_for_write(entries: &StoreEntries) -> Vec<(&str, &StoreValue)> {
    let mut out: Vec<(&str, &StoreValue)> = entries
        .iter()
        .filter(|(k, _)| k.as_str() != KEY_INSTALLED_MARKER)
        .map(|(k, v)| (k.as_str(), v))
        .collect();
    out.sort_by_key(|(k, _)| {
        MANAGED_KEYS
            .iter()
            .position(|m| m == k)
            .unwrap_or(MANAGED_KEYS.len())
    });
    if let Some(marker) = entries.get(KEY_INSTALLED_MARKER) {
        out.push((KEY_INSTALLED_MARKER, marker));
    }
    out
}

/// Rollback helper: erase everything, logging (never returning) any failure.
pub fn erase_all_best_effort(store: &dyn StateStore, reason: &str) {
    match store.erase_all() {
        Ok(()) => info!(
            "[PHASE: rollback] [STEP: erase_all] Persistent state erased (reason={})",
            reason
        ),
        Err(e) => warn!(
            "[PHASE: rollback] [STEP: erase_all] Failed to erase persistent state (reason={}): {}",
            reason, e
        ),
    }
}

pub fn default_store(config: &InstallerConfig) -> Box<dyn StateStore> {
    #[cfg(windows)]
    {
        Box::new(crate::installation::registry::RegistryStateStore::from_config(config))
    }
    #[cfg(not(windows))]
    {
        Box::new(FileStateStore::from_config(config))
    }
}

// ============================================================================
// File-backed store (JSON document + XDG autostart entry)
// ============================================================================

const STATE_FILE_NAME: &str = "installer-state.json";

#[derive(Debug, Clone)]
pub struct FileStateStore {
    state_file: PathBuf,
    autostart_file: PathBuf,
    autostart_name: String,
}

impl FileStateStore {
    pub fn new(state_dir: &Path, autostart_dir: &Path, autostart_name: &str) -> Self {
        Self {
            state_file: state_dir.join(STATE_FILE_NAME),
            autostart_file: autostart_dir.join(format!("{}.desktop", autostart_name)),
            autostart_name: autostart_name.to_string(),
        }
    }

    pub fn from_config(config: &InstallerConfig) -> Self {
        Self::new(&config.state_dir, &config.autostart_dir, &config.autostart_name)
    }

    pub fn state_file(&self) -> &Path {
        &self.state_file
    }

    pub fn autostart_file(&self) -> &Path {
        &self.autostart_file
    }

    fn load(&self) -> Result<StoreEntries, StoreError> {
        let bytes = match std::fs::read(&self.state_file) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StoreEntries::new()),
            Err(e) => {
                return Err(StoreError::Io {
                    path: self.state_file.clone(),
                    source: e,
                })
            }
        };
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Malformed {
            path: self.state_file.clone(),
            source: e,
        })
    }

    fn save(&self, entries: &StoreEntries) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(entries).map_err(|e| StoreError::Malformed {
            path: self.state_file.clone(),
            source: e,
        })?;
        write_atomically(&self.state_file, &bytes)
    }
}

/// Write via a sibling temp file + rename so readers never observe a half-written document.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let io_err = |p: &Path| {
        let p = p.to_path_buf();
        move |source: std::io::Error| StoreError::Io { path: p, source }
    };

    let dir = path
        .parent()
        .ok_or_else(|| StoreError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no parent"),
        })?;
    std::fs::create_dir_all(dir).map_err(io_err(dir))?;

    let tmp = dir.join(format!(
        ".{}.tmp-{}",
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        uuid::Uuid::new_v4().simple()
    ));
    let result = (|| {
        let mut f = std::fs::File::create(&tmp).map_err(io_err(&tmp))?;
        f.write_all(bytes).map_err(io_err(&tmp))?;
        f.sync_all().map_err(io_err(&tmp))?;
        std::fs::rename(&tmp, path).map_err(io_err(path))
    })();
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

fn remove_if_present(path: &Path) -> Result<(), StoreError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Build an XDG desktop entry that launches `executable` from its own directory.
pub fn build_autostart_entry(name: &str, executable: &Path) -> String {
    let exec = executable.to_string_lossy();
    let exec_quoted = if exec.contains(' ') || exec.contains('"') {
        format!("\"{}\"", exec.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        exec.to_string()
    };
    let working_dir = executable
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default();

    format!(
        "[Desktop Entry]\nType=Application\nName={name}\nExec={exec_quoted}\nPath={working_dir}\nTerminal=false\nX-GNOME-Autostart-enabled=true\n"
    )
}

impl StateStore for FileStateStore {
    fn write_all(&self, entries: &StoreEntries) -> Result<(), StoreError> {
        debug!(
            "[PHASE: configuring] [STEP: write_all] FileStateStore write_all entered (file={:?}, keys={})",
            self.state_file,
            entries.len()
        );
        let mut doc = self.load()?;
        for (k, v) in ordered_for_write(entries) {
            doc.insert(k.to_string(), v.clone());
        }
        self.save(&doc)?;
        info!(
            "[PHASE: configuring] [STEP: write_all] Wrote {} keys to {:?}",
            entries.len(),
            self.state_file
        );
        Ok(())
    }

    fn erase_all(&self) -> Result<(), StoreError> {
        let state = remove_if_present(&self.state_file);
        let autostart = remove_if_present(&self.autostart_file);
        if let Some(dir) = self.state_file.parent() {
            // Only succeeds when empty; anything else is left alone.
            match std::fs::remove_dir(dir) {
                Ok(()) => debug!(
                    "[PHASE: rollback] [STEP: erase_all] Removed empty state directory {:?}",
                    dir
                ),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => debug!(
                    "[PHASE: rollback] [STEP: erase_all] Kept state directory {:?}: {}",
                    dir, e
                ),
            }
        }
        state?;
        autostart
    }

    fn read_all(&self) -> Result<StoreEntries, StoreError> {
        self.load()
    }

    fn register_autostart(&self, executable: &Path) -> Result<(), StoreError> {
        let entry = build_autostart_entry(&self.autostart_name, executable);
        write_atomically(&self.autostart_file, entry.as_bytes())?;
        info!(
            "[PHASE: configuring] [STEP: autostart] Registered login auto-start at {:?}",
            self.autostart_file
        );
        Ok(())
    }

    fn clear_autostart(&self) -> Result<(), StoreError> {
        remove_if_present(&self.autostart_file)
    }

    fn autostart_registered(&self) -> Result<bool, StoreError> {
        Ok(self.autostart_file.is_file())
    }
}

// ============================================================================
// In-memory store with fault injection (tests only)
// ============================================================================
