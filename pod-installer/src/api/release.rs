// Release metadata lookup
//
// One GET against the releases API at startup. Transient network failures are retried with
// exponential backoff; anything else fails the run (there is no fallback tag).

use anyhow::{Context, Result};
use log::{info, warn};
use serde::Deserialize;
use tokio::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use crate::config::InstallerConfig;

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
}

/// Fetch the newest release tag, e.g. `v1.2.3`.
pub async fn fetch_latest_release_tag(config: &InstallerConfig) -> Result<String> {
    let url = config.latest_release_url();
    info!(
        "[PHASE: initialization] [STEP: release_tag] Looking up latest release (url={})",
        url
    );

    let client = reqwest::Client::builder()
        .timeout(config.http_timeout())
        .user_agent(concat!("wirepod-installer/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    let attempt = || async {
        let resp = client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(anyhow::anyhow!("HTTP {} from {}", resp.status(), url));
        }
        let release: Release = resp.json().await?;
        Ok::<String, anyhow::Error>(release.tag_name)
    };

    let retry_strategy = ExponentialBackoff::from_millis(150)
        .factor(2)
        .max_delay(Duration::from_secs(2))
        .take(3)
        .map(jitter);

    let tag = RetryIf::spawn(retry_strategy, attempt, |e: &anyhow::Error| {
        let transient = is_transient(e);
        if transient {
            warn!(
                "[PHASE: initialization] [STEP: release_tag] Transient lookup failure, retrying: {}",
                e
            );
        }
        transient
    })
    .await
    .with_context(|| format!("Failed to get the latest release tag from {}", url))?;

    let tag = tag.trim().to_string();
    if tag.is_empty() {
        anyhow::bail!("Release metadata from {} has an empty tag_name", url);
    }
    info!(
        "[PHASE: initialization] [STEP: release_tag] Latest release is {}",
        tag
    );
    Ok(tag)
}

fn is_transient(e: &anyhow::Error) -> bool {
    if let Some(re) = e.downcast_ref::<reqwest::Error>() {
        return re.is_timeout() || re.is_connect() || re.is_request();
    }
    let msg = e.to_string().to_ascii_lowercase();
    msg.contains("http 5") || msg.contains("timed out") || msg.contains("connection")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installation::fetch::test_support::serve;

    fn config_for(api_base_url: String) -> InstallerConfig {
        InstallerConfig {
            api_base_url,
            http_timeout_secs: 5,
            ..InstallerConfig::default()
        }
    }

    #[tokio::test]
    async fn reads_tag_name_from_release_json() {
        let base = serve(
            "200 OK",
            br#"{"tag_name":"v1.4.0","name":"wire-pod v1.4.0","draft":false}"#.to_vec(),
        )
        .await;
        let tag = fetch_latest_release_tag(&config_for(base)).await.unwrap();
        assert_eq!(tag, "v1.4.0");
    }

    #[tokio::test]
    async fn not_found_fails_without_fallback() {
        let base = serve("404 Not Found", br#"{"message":"Not Found"}"#.to_vec()).await;
        let err = fetch_latest_release_tag(&config_for(base)).await.unwrap_err();
        assert!(format!("{:#}", err).contains("404"));
    }

    #[tokio::test]
    async fn missing_tag_name_is_an_error() {
        let base = serve("200 OK", br#"{"name":"no tag here"}"#.to_vec()).await;
        assert!(fetch_latest_release_tag(&config_for(base)).await.is_err());
    }

    #[test]
    fn server_errors_are_transient_but_client_errors_are_not() {
        assert!(is_transient(&anyhow::anyhow!("HTTP 503 Service Unavailable from x")));
        assert!(!is_transient(&anyhow::anyhow!("HTTP 404 Not Found from x")));
    }
}
