// Installer run context
//
// NOTE: Not persisted. Built once at startup and passed by reference to the orchestrator and the
// presentation layer; it lives exactly as long as the run.

use std::path::{Path, PathBuf};

use crate::config::InstallerConfig;
use crate::models::progress::ProgressReporter;

#[derive(Debug)]
pub struct InstallerContext {
    config: InstallerConfig,
    release_tag: String,
    progress: ProgressReporter,
}

impl InstallerContext {
    pub fn new(config: InstallerConfig, release_tag: impl Into<String>) -> Self {
        Self {
            config,
            release_tag: release_tag.into(),
            progress: ProgressReporter::new(),
        }
    }

    pub fn config(&self) -> &InstallerConfig {
        &self.config
    }

    pub fn release_tag(&self) -> &str {
        &self.release_tag
    }

    pub fn progress(&self) -> &ProgressReporter {
        &self.progress
    }

    pub fn artifact_url(&self) -> String {
        self.config.artifact_url_for(&self.release_tag)
    }

    pub fn service_executable_in(&self, install_dir: &Path) -> PathBuf {
        self.config.service_executable_in(install_dir)
    }
}
