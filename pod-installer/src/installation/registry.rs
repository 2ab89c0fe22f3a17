// Windows registry store
//
// Values live under HKLM\<registry_key> (default `SOFTWARE\wire-pod`). Login auto-start is a value
// in HKLM\...\CurrentVersion\Run; an Add/Remove Programs entry is kept alongside so the pod can be
// found by the platform's uninstall UI.

use log::{debug, info, warn};
use std::io;
use std::path::Path;
use winreg::enums::{HKEY_LOCAL_MACHINE, KEY_READ, KEY_WRITE, REG_DWORD, REG_SZ};
use winreg::types::FromRegValue;
use winreg::RegKey;

use crate::config::InstallerConfig;
use crate::error::StoreError;
use crate::installation::store::{
    ordered_for_write, StateStore, StoreEntries, StoreValue, KEY_INSTALL_PATH,
};

const RUN_KEY: &str = r"SOFTWARE\Microsoft\Windows\CurrentVersion\Run";
const UNINSTALL_ROOT: &str = r"SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall";

#[derive(Debug, Clone)]
pub struct RegistryStateStore {
    key_path: String,
    run_value: String,
}

fn reg_err(operation: &str) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Registry {
        operation: operation.to_string(),
        source,
    }
}

fn ignore_missing(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

impl RegistryStateStore {
    pub fn new(key_path: impl Into<String>, run_value: impl Into<String>) -> Self {
        Self {
            key_path: key_path.into(),
            run_value: run_value.into(),
        }
    }

    pub fn from_config(config: &InstallerConfig) -> Self {
        Self::new(config.registry_key.clone(), config.autostart_name.clone())
    }

    fn uninstall_key_path(&self) -> String {
        format!(r"{}\{}", UNINSTALL_ROOT, self.run_value)
    }

    fn write_uninstall_entry(&self, install_path: &str) -> Result<(), StoreError> {
        let hklm = RegKey::predef(HKEY_LOCAL_MACHINE);
        let (key, _) = hklm
            .create_subkey(self.uninstall_key_path())
            .map_err(reg_err("create_uninstall_key"))?;
        let installer = std::env::current_exe()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default();
        key.set_value("DisplayName", &self.run_value)
            .and_then(|_| key.set_value("InstallLocation", &install_path))
            .and_then(|_| key.set_value("Publisher", &"wire-pod"))
            .and_then(|_| key.set_value("UninstallString", &format!("\"{}\" --uninstall", installer)))
            .and_then(|_| key.set_value("NoModify", &1u32))
            .and_then(|_| key.set_value("NoRepair", &1u32))
            .map_err(reg_err("write_uninstall_entry"))
    }
}

impl StateStore for RegistryStateStore {
    fn write_all(&self, entries: &StoreEntries) -> Result<(), StoreError> {
        debug!(
            "[PHASE: configuring] [STEP: write_all] RegistryStateStore write_all entered (key=HKLM\\{}, keys={})",
            self.key_path,
            entries.len()
        );
        let hklm = RegKey::predef(HKEY_LOCAL_MACHINE);
        let (key, _) = hklm
            .create_subkey(&self.key_path)
            .map_err(reg_err("create_key"))?;

        if let Some(path) = entries.get(KEY_INSTALL_PATH).and_then(StoreValue::as_text) {
            self.write_uninstall_entry(path)?;
        }

        for (name, value) in ordered_for_write(entries) {
            let result = match value {
                StoreValue::Bool(b) => key.set_value(name, &u32::from(*b)),
                StoreValue::Text(s) => key.set_value(name, s),
            };
            result.map_err(reg_err("set_value"))?;
        }

        info!(
            "[PHASE: configuring] [STEP: write_all] Wrote {} values under HKLM\\{}",
            entries.len(),
            self.key_path
        );
        Ok(())
    }

    fn erase_all(&self) -> Result<(), StoreError> {
        let hklm = RegKey::predef(HKEY_LOCAL_MACHINE);
        let values = ignore_missing(hklm.delete_subkey_all(&self.key_path))
            .map_err(reg_err("delete_key"));
        let uninstall = ignore_missing(hklm.delete_subkey_all(self.uninstall_key_path()))
            .map_err(reg_err("delete_uninstall_key"));
        let autostart = self.clear_autostart();
        if let Err(e) = &uninstall {
            warn!(
                "[PHASE: rollback] [STEP: erase_all] Uninstall entry removal failed: {}",
                e
            );
        }
        values?;
        autostart
    }

    fn read_all(&self) -> Result<StoreEntries, StoreError> {
        let hklm = RegKey::predef(HKEY_LOCAL_MACHINE);
        let key = match hklm.open_subkey_with_flags(&self.key_path, KEY_READ) {
            Ok(k) => k,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(StoreEntries::new()),
            Err(e) => return Err(reg_err("open_key")(e)),
        };

        let mut entries = StoreEntries::new();
        for item in key.enum_values() {
            let (name, raw) = item.map_err(reg_err("enum_values"))?;
            let value = match raw.vtype {
                REG_DWORD => StoreValue::Bool(
                    u32::from_reg_value(&raw).map_err(reg_err("read_dword"))? != 0,
                ),
                REG_SZ => StoreValue::Text(
                    String::from_reg_value(&raw).map_err(reg_err("read_string"))?,
                ),
                _ => continue,
            };
            entries.insert(name, value);
        }
        Ok(entries)
    }

    fn register_autostart(&self, executable: &Path) -> Result<(), StoreError> {
        let hklm = RegKey::predef(HKEY_LOCAL_MACHINE);
        let run = hklm
            .open_subkey_with_flags(RUN_KEY, KEY_WRITE)
            .map_err(reg_err("open_run_key"))?;
        let command = format!("\"{}\"", executable.to_string_lossy());
        run.set_value(&self.run_value, &command)
            .map_err(reg_err("set_run_value"))?;
        info!(
            "[PHASE: configuring] [STEP: autostart] Registered login auto-start (value={}, command={})",
            self.run_value, command
        );
        Ok(())
    }

    fn clear_autostart(&self) -> Result<(), StoreError> {
        let hklm = RegKey::predef(HKEY_LOCAL_MACHINE);
        let run = match hklm.open_subkey_with_flags(RUN_KEY, KEY_WRITE) {
            Ok(k) => k,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(reg_err("open_run_key")(e)),
        };
        ignore_missing(run.delete_value(&self.run_value)).map_err(reg_err("delete_run_value"))
    }

    fn autostart_registered(&self) -> Result<bool, StoreError> {
        let hklm = RegKey::predef(HKEY_LOCAL_MACHINE);
        let run = match hklm.open_subkey_with_flags(RUN_KEY, KEY_READ) {
            Ok(k) => k,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(reg_err("open_run_key")(e)),
        };
        match run.get_value::<String, _>(&self.run_value) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(reg_err("get_run_value")(e)),
        }
    }
}
