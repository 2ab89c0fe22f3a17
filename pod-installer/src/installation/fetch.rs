// Artifact fetcher
//
// Download the release archive next to its destination, unpack it on a blocking worker, then
// delete the archive. Progress: download maps to 0-80, extraction to 80-100. No partial
// extraction recovery; the caller rolls back instead.

use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;

use crate::error::FetchError;
use crate::installation::{ensure_dir_with_retries, files};
use crate::models::progress::{scale_percent, MonotonicProgress};

const DOWNLOAD_END: f64 = 80.0;

#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Download `url` and extract it into `dest` (created if absent).
    async fn fetch_and_unpack(
        &self,
        url: &str,
        dest: &Path,
        on_progress: MonotonicProgress,
    ) -> Result<(), FetchError>;
}

#[derive(Debug, Clone)]
pub struct HttpArtifactFetcher {
    client: reqwest::Client,
}

impl HttpArtifactFetcher {
    /// `timeout` bounds connecting and each read, so a server that stalls mid-body fails the
    /// download instead of hanging it.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .user_agent(concat!("wirepod-installer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { client })
    }

    async fn download_to(
        &self,
        url: &str,
        archive: &Path,
        on_progress: &MonotonicProgress,
    ) -> Result<u64, FetchError> {
        let network = |e: reqwest::Error| FetchError::Network {
            url: url.to_string(),
            source: e,
        };
        let io = |e: std::io::Error| FetchError::Io {
            path: archive.to_path_buf(),
            source: e,
        };

        let resp = self.client.get(url).send().await.map_err(network)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let total = resp.content_length().filter(|n| *n > 0);
        debug!(
            "[PHASE: fetching] [STEP: download] Response ok (url={}, content_length={:?})",
            url, total
        );

        let mut file = tokio::fs::File::create(archive).await.map_err(io)?;
        let mut stream = resp.bytes_stream();
        let mut downloaded: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(network)?;
            file.write_all(&chunk).await.map_err(io)?;
            downloaded += chunk.len() as u64;
            if let Some(total) = total {
                let sub = (downloaded as f64 / total as f64) * 100.0;
                on_progress.report(scale_percent(sub, 0.0, DOWNLOAD_END));
            }
        }
        file.flush().await.map_err(io)?;
        file.sync_all().await.map_err(io)?;

        on_progress.report(DOWNLOAD_END);
        Ok(downloaded)
    }
}

#[async_trait]
impl ArtifactFetcher for HttpArtifactFetcher {
    async fn fetch_and_unpack(
        &self,
        url: &str,
        dest: &Path,
        on_progress: MonotonicProgress,
    ) -> Result<(), FetchError> {
        let started = Instant::now();
        info!(
            "[PHASE: fetching] [STEP: download] fetch_and_unpack entered (url={}, dest={:?})",
            url, dest
        );

        ensure_dir_with_retries(dest, "create_install_dir")
            .await
            .map_err(|e| FetchError::Io {
                path: dest.to_path_buf(),
                source: e,
            })?;
        on_progress.report(0.0);

        let archive = dest.join(format!(".download-{}.zip", uuid::Uuid::new_v4().simple()));
        let result = self.fetch_into(url, dest, &archive, &on_progress).await;

        match tokio::fs::remove_file(&archive).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "[PHASE: fetching] [STEP: cleanup] Failed to remove temporary archive {:?}: {}",
                archive, e
            ),
        }

        if result.is_ok() {
            on_progress.report(100.0);
            info!(
                "[PHASE: fetching] [STEP: extract] fetch_and_unpack exit ok (dest={:?}, duration_ms={})",
                dest,
                started.elapsed().as_millis()
            );
        }
        result
    }
}

impl HttpArtifactFetcher {
    async fn fetch_into(
        &self,
        url: &str,
        dest: &Path,
        archive: &Path,
        on_progress: &MonotonicProgress,
    ) -> Result<(), FetchError> {
        let bytes = self.download_to(url, archive, on_progress).await?;
        match files::sha256_file(archive).await {
            Ok(digest) => info!(
                "[PHASE: fetching] [STEP: download] Archive downloaded (bytes={}, sha256={})",
                bytes, digest
            ),
            Err(e) => warn!(
                "[PHASE: fetching] [STEP: download] Could not hash archive {:?}: {}",
                archive, e
            ),
        }

        let archive_owned = archive.to_path_buf();
        let dest_owned = dest.to_path_buf();
        let progress = on_progress.clone();
        let count = tokio::task::spawn_blocking(move || {
            unpack_archive(&archive_owned, &dest_owned, |sub| {
                progress.report(scale_percent(sub, DOWNLOAD_END, 100.0))
            })
        })
        .await
        .map_err(|e| FetchError::Worker(e.to_string()))??;

        info!(
            "[PHASE: fetching] [STEP: extract] Extracted {} files into {:?}",
            count, dest
        );
        Ok(())
    }
}

/// Extract every entry of the zip at `archive` into `dest`, calling `on_entry` with the fraction
/// of entries done (0-100). The extracted files are added to the install manifest. Returns the
/// number of files written.
pub fn unpack_archive(
    archive: &Path,
    dest: &Path,
    on_entry: impl Fn(f64),
) -> Result<usize, FetchError> {
    let io_at = |p: &Path| {
        let p = p.to_path_buf();
        move |e: std::io::Error| FetchError::Io { path: p, source: e }
    };

    let file = std::fs::File::open(archive).map_err(io_at(archive))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| FetchError::CorruptArchive(e.to_string()))?;
    let total = zip.len();
    let mut written: Vec<PathBuf> = Vec::new();

    for i in 0..total {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| FetchError::CorruptArchive(e.to_string()))?;
        let relative: PathBuf = entry
            .enclosed_name()
            .map(Path::to_path_buf)
            .ok_or_else(|| {
                FetchError::CorruptArchive(format!("entry '{}' escapes the target", entry.name()))
            })?;
        let out = dest.join(&relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out).map_err(io_at(&out))?;
        } else {
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent).map_err(io_at(parent))?;
            }
            let mut target = std::fs::File::create(&out).map_err(io_at(&out))?;
            std::io::copy(&mut entry, &mut target).map_err(|e| {
                if e.kind() == std::io::ErrorKind::InvalidData {
                    FetchError::CorruptArchive(format!("entry '{}': {}", relative.display(), e))
                } else {
                    FetchError::Io {
                        path: out.clone(),
                        source: e,
                    }
                }
            })?;
            written.push(relative.clone());

            #[cfg(unix)]
            if let Some(mode) = entry.unix_mode() {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&out, std::fs::Permissions::from_mode(mode))
                    .map_err(io_at(&out))?;
            }
        }

        on_entry(((i + 1) as f64 / total as f64) * 100.0);
    }

    files::write_install_manifest(dest, &written)
        .map_err(io_at(&dest.join(files::INSTALL_MANIFEST)))?;
    Ok(written.len())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::Write;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use zip::write::FileOptions;

    /// A zip holding `chipper/chipper` (executable) and `chipper/webroot/index.html`.
    pub fn sample_zip() -> Vec<u8> {
        let cursor = std::io::Cursor::new(Vec::<u8>::new());
        let mut zip = zip::ZipWriter::new(cursor);
        let exe = FileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .unix_permissions(0o755);
        let plain = FileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .unix_permissions(0o644);
        zip.add_directory("chipper/", plain).unwrap();
        zip.start_file("chipper/chipper", exe).unwrap();
        zip.write_all(b"#!/bin/sh\nexit 0\n").unwrap();
        zip.start_file("chipper/webroot/index.html", plain).unwrap();
        zip.write_all(b"<html>wire-pod</html>").unwrap();
        zip.finish().unwrap().into_inner()
    }

    /// Serve one canned HTTP response per connection until the test ends.
    pub async fn serve(status: &'static str, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let body = body.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = socket.read(&mut buf).await;
                    let head = format!(
                        "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        status,
                        body.len()
                    );
                    let _ = socket.write_all(head.as_bytes()).await;
                    let _ = socket.write_all(&body).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        format!("http://{}", addr)
    }

    /// Announce a large body, send a few bytes, then go silent while holding the connection.
    pub async fn serve_stalling() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let head = "HTTP/1.1 200 OK\r\nContent-Length: 1000000\r\n\r\n";
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(b"PK").await;
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        });
        format!("http://{}", addr)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{sample_zip, serve, serve_stalling};
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder() -> (MonotonicProgress, Arc<Mutex<Vec<f64>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let progress = MonotonicProgress::new(Arc::new(move |p| sink.lock().unwrap().push(p)));
        (progress, seen)
    }

    fn fetcher() -> HttpArtifactFetcher {
        HttpArtifactFetcher::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn fetch_and_unpack_extracts_archive_with_progress() {
        let base = serve("200 OK", sample_zip()).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("wire-pod");
        let (progress, seen) = recorder();

        fetcher()
            .fetch_and_unpack(&format!("{}/wire-pod.zip", base), &dest, progress)
            .await
            .unwrap();

        assert!(dest.join("chipper/chipper").is_file());
        assert_eq!(
            std::fs::read_to_string(dest.join("chipper/webroot/index.html")).unwrap(),
            "<html>wire-pod</html>"
        );
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(dest.join("chipper/chipper"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o111, 0o111);
        }

        // Temporary archive is gone.
        let leftovers: Vec<_> = std::fs::read_dir(&dest)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .filter(|n| n.starts_with(".download-"))
            .collect();
        assert!(leftovers.is_empty());

        let manifest =
            std::fs::read_to_string(dest.join(files::INSTALL_MANIFEST)).unwrap();
        let mut listed: Vec<PathBuf> = manifest.lines().map(PathBuf::from).collect();
        listed.sort();
        assert_eq!(
            listed,
            vec![
                PathBuf::from("chipper/chipper"),
                PathBuf::from("chipper/webroot/index.html"),
            ]
        );

        let seen = seen.lock().unwrap();
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(seen.last().copied(), Some(100.0));
        assert!(seen.iter().all(|p| (0.0..=100.0).contains(p)));
    }

    #[tokio::test]
    async fn http_error_status_is_reported() {
        let base = serve("404 Not Found", b"missing".to_vec()).await;
        let dir = tempfile::tempdir().unwrap();
        let (progress, _) = recorder();

        let err = fetcher()
            .fetch_and_unpack(&format!("{}/nope.zip", base), dir.path(), progress)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Http { status: 404, .. }));
    }

    #[tokio::test]
    async fn connection_refused_is_a_network_error() {
        // Bind then drop to get a port nothing listens on.
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let dir = tempfile::tempdir().unwrap();
        let (progress, _) = recorder();

        let err = fetcher()
            .fetch_and_unpack(
                &format!("http://127.0.0.1:{}/wire-pod.zip", port),
                dir.path(),
                progress,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Network { .. }));
    }

    #[tokio::test]
    async fn stalled_body_times_out_instead_of_hanging() {
        let base = serve_stalling().await;
        let dir = tempfile::tempdir().unwrap();
        let (progress, _) = recorder();
        let fetcher = HttpArtifactFetcher::new(Duration::from_millis(500)).unwrap();

        let result = tokio::time::timeout(
            Duration::from_secs(15),
            fetcher.fetch_and_unpack(&format!("{}/wire-pod.zip", base), dir.path(), progress),
        )
        .await
        .expect("download should give up on a stalled body");

        assert!(matches!(result, Err(FetchError::Network { .. })));
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn garbage_body_is_a_corrupt_archive() {
        let base = serve("200 OK", b"this is not a zip file".to_vec()).await;
        let dir = tempfile::tempdir().unwrap();
        let (progress, _) = recorder();

        let err = fetcher()
            .fetch_and_unpack(&format!("{}/wire-pod.zip", base), dir.path(), progress)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::CorruptArchive(_)));
    }

    #[test]
    fn unpack_rejects_entries_escaping_dest() {
        use std::io::Write;
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("evil.zip");
        {
            let file = std::fs::File::create(&archive).unwrap();
            let mut zip = zip::ZipWriter::new(file);
            zip.start_file("../escape.txt", zip::write::FileOptions::default())
                .unwrap();
            zip.write_all(b"x").unwrap();
            zip.finish().unwrap();
        }
        let dest = dir.path().join("dest");
        std::fs::create_dir_all(&dest).unwrap();

        let err = unpack_archive(&archive, &dest, |_| {}).unwrap_err();
        assert!(matches!(err, FetchError::CorruptArchive(_)));
        assert!(!dir.path().join("escape.txt").exists());
    }
}
