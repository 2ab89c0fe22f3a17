// Installation building blocks
//
// Elevation guard, persistent state store, process tracker and artifact fetcher. The
// orchestrator in `api::installer` sequences them; nothing in here decides phase order.

pub mod elevation;
pub mod fetch;
pub mod files;
pub mod process;
pub mod store;

#[cfg(windows)]
pub mod registry;

use log::{info, warn};
use std::path::Path;
use std::time::Instant;
use tokio::time::{timeout, Duration};

/// Create `path` (and parents) with a short timeout and up to 3 attempts.
pub async fn ensure_dir_with_retries(path: &Path, label: &str) -> std::io::Result<()> {
    let mut last_err: Option<std::io::Error> = None;
    for attempt in 1..=3 {
        let started = Instant::now();
        match timeout(Duration::from_secs(5), tokio::fs::create_dir_all(path)).await {
            Ok(Ok(())) => {
                info!(
                    "[PHASE: installation] [STEP: fs] {} ok (attempt={}, path={:?}, duration_ms={})",
                    label,
                    attempt,
                    path,
                    started.elapsed().as_millis()
                );
                return Ok(());
            }
            Ok(Err(e)) => {
                warn!(
                    "[PHASE: installation] [STEP: fs] {} failed (attempt={}, path={:?}, error={:?})",
                    label, attempt, path, e
                );
                last_err = Some(e);
            }
            Err(_) => {
                warn!(
                    "[PHASE: installation] [STEP: fs] {} timed out (attempt={}, path={:?})",
                    label, attempt, path
                );
                last_err = Some(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "create_dir_all timed out",
                ));
            }
        }
        let backoff_ms = 50_u64.saturating_mul(1_u64 << ((attempt - 1) as u32));
        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
    }

    Err(last_err.unwrap_or_else(|| std::io::Error::other("Failed to create directory")))
}
