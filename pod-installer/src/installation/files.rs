//! File helpers for the install directory.
//!
//! Used to fingerprint downloaded archives, to record which files an install extracted, and to
//! remove exactly those files on uninstall.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::collections::BTreeSet;
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use std::time::Instant;
use tokio::io::AsyncReadExt;

/// Recursively collect all regular files under `root`.
pub async fn collect_files_recursive(root: &Path) -> Result<Vec<PathBuf>> {
    let started = Instant::now();
    debug!(
        "[PHASE: files] [STEP: collect] collect_files_recursive entered (root={:?})",
        root
    );

    let mut out: Vec<PathBuf> = Vec::new();
    let mut stack: Vec<PathBuf> = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut rd = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("read_dir failed: {:?}", dir))?;
        while let Some(ent) = rd.next_entry().await? {
            let p = ent.path();
            let meta = ent.metadata().await?;
            if meta.is_dir() {
                stack.push(p);
            } else if meta.is_file() {
                out.push(p);
            }
        }
    }

    debug!(
        "[PHASE: files] [STEP: collect] collect_files_recursive exit (files={}, duration_ms={})",
        out.len(),
        started.elapsed().as_millis()
    );
    Ok(out)
}

/// Hex-encoded SHA-256 of the file at `path`.
pub async fn sha256_file(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("open failed: {:?}", path))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .await
            .with_context(|| format!("read failed: {:?}", path))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex_digest(&hasher.finalize()))
}

pub fn hex_digest(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Manifest of extracted files, relative to the install directory, one per line.
pub const INSTALL_MANIFEST: &str = ".wirepod-installed-files";

/// What `remove_install_dir` took away.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemovalSummary {
    pub files_removed: usize,
    pub directory_removed: bool,
}

/// Record `files` (relative to `root`) in the install manifest, merged with any earlier entries.
pub fn write_install_manifest(root: &Path, files: &[PathBuf]) -> std::io::Result<()> {
    let path = root.join(INSTALL_MANIFEST);
    let mut entries: BTreeSet<String> = match std::fs::read_to_string(&path) {
        Ok(text) => text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeSet::new(),
        Err(e) => return Err(e),
    };
    entries.extend(files.iter().map(|f| f.to_string_lossy().to_string()));

    let mut text = entries.into_iter().collect::<Vec<_>>().join("\n");
    text.push('\n');
    std::fs::write(&path, text)?;
    debug!(
        "[PHASE: fetching] [STEP: manifest] Install manifest updated (path={:?}, new_files={})",
        path,
        files.len()
    );
    Ok(())
}

/// Only plain relative paths; anything with a root, prefix or `..` is refused.
fn is_contained(relative: &Path) -> bool {
    relative.components().next().is_some()
        && relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

/// Remove the files listed in the install manifest, then any directories that became empty,
/// then `root` itself if nothing else is left in it. A directory without a manifest was not
/// populated by this installer and is left untouched. Safe to call again.
pub async fn remove_install_dir(root: &Path) -> Result<RemovalSummary> {
    if !tokio::fs::try_exists(root).await.unwrap_or(false) {
        info!(
            "[PHASE: uninstall] [STEP: files] Install directory already absent: {:?}",
            root
        );
        return Ok(RemovalSummary::default());
    }

    let manifest_path = root.join(INSTALL_MANIFEST);
    let manifest = match tokio::fs::read_to_string(&manifest_path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(
                "[PHASE: uninstall] [STEP: files] No install manifest in {:?}; leaving the directory untouched",
                root
            );
            return Ok(RemovalSummary::default());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("read failed: {:?}", manifest_path));
        }
    };

    let mut summary = RemovalSummary::default();
    let mut dirs: BTreeSet<PathBuf> = BTreeSet::new();
    for line in manifest.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let relative = PathBuf::from(line);
        if !is_contained(&relative) {
            warn!(
                "[PHASE: uninstall] [STEP: files] Skipping manifest entry outside the install directory: {}",
                line
            );
            continue;
        }
        match tokio::fs::remove_file(root.join(&relative)).await {
            Ok(()) => summary.files_removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "[PHASE: uninstall] [STEP: files] Failed to remove {:?}: {}",
                relative, e
            ),
        }
        dirs.extend(
            relative
                .ancestors()
                .skip(1)
                .filter(|a| !a.as_os_str().is_empty())
                .map(Path::to_path_buf),
        );
    }
    tokio::fs::remove_file(&manifest_path)
        .await
        .with_context(|| format!("remove failed: {:?}", manifest_path))?;

    // Deepest first; non-empty directories hold files we did not write and stay.
    let mut dirs: Vec<PathBuf> = dirs.into_iter().collect();
    dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
    for dir in dirs {
        if let Err(e) = tokio::fs::remove_dir(root.join(&dir)).await {
            debug!(
                "[PHASE: uninstall] [STEP: files] Kept directory {:?}: {}",
                dir, e
            );
        }
    }

    match tokio::fs::remove_dir(root).await {
        Ok(()) => summary.directory_removed = true,
        Err(_) => {
            let kept = collect_files_recursive(root).await.map(|f| f.len()).unwrap_or(0);
            info!(
                "[PHASE: uninstall] [STEP: files] Kept {:?}; it still holds {} files not installed by wire-pod",
                root, kept
            );
        }
    }

    info!(
        "[PHASE: uninstall] [STEP: files] Install files removed (root={:?}, files={}, directory_removed={})",
        root, summary.files_removed, summary.directory_removed
    );
    Ok(summary)
}
