//! Release feed lookup.
//!
//! Both channels read the same GitHub releases list; the channel only
//! decides which entry is picked. The list comes back newest first.

use reqwest::Client;
use std::env;
use std::time::Duration;
use tracing::{debug, info};
use winterpack_core::UpdateError;
use winterpack_core::fs_util::normalize_sha256;
use winterpack_core::platform::Os;
use winterpack_core::version::{Channel, Version};

use crate::github_models::{AssetItem, ReleaseItem};
use crate::http::{build_client, is_network_error, is_retryable};

pub const DEFAULT_UPDATE_REPO: &str = "winterpack/winterpack-launcher";
pub const UPDATE_REPO_ENV: &str = "WINTERPACK_UPDATE_REPO";
pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const UPDATE_API_ENV: &str = "WINTERPACK_UPDATE_API";

const RELEASES_PER_PAGE: u32 = 30;

#[derive(Clone, Debug)]
pub struct ReleaseInfo {
    pub version: Version,
    pub tag: String,
    pub asset_url: String,
    pub asset_name: String,
    /// Lowercase hex, when the feed publishes a digest.
    pub sha256: Option<String>,
    pub size: Option<u64>,
}

/// The release asset built for one OS/architecture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetTarget {
    pub name: String,
    pub os: Os,
    pub arch: String,
}

impl AssetTarget {
    pub fn for_platform(os: Os, arch: &str) -> Self {
        let arch = if arch == "aarch64" { "aarch64" } else { "x86_64" };
        let name = match os {
            Os::Windows => "winterpack-windows-x86_64.exe".to_string(),
            Os::MacOs => "winterpack-macos-universal".to_string(),
            Os::Linux => format!("winterpack-linux-{arch}"),
        };
        Self {
            name,
            os,
            arch: arch.to_string(),
        }
    }

    pub fn current() -> Self {
        Self::for_platform(Os::current(), env::consts::ARCH)
    }

    fn matches_loosely(&self, asset_name: &str) -> bool {
        let lower = asset_name.to_ascii_lowercase();
        if !lower.contains(self.os.as_str()) {
            return false;
        }
        match self.os {
            Os::Windows => lower.ends_with(".exe"),
            Os::MacOs => true,
            Os::Linux => lower.contains(&self.arch),
        }
    }

    fn select<'a>(&self, assets: &'a [AssetItem]) -> Option<&'a AssetItem> {
        assets
            .iter()
            .find(|asset| asset.name == self.name)
            .or_else(|| assets.iter().find(|asset| self.matches_loosely(&asset.name)))
    }
}

pub fn resolve_repo() -> String {
    env_or(UPDATE_REPO_ENV, DEFAULT_UPDATE_REPO)
}

pub fn resolve_api_base() -> String {
    env_or(UPDATE_API_ENV, DEFAULT_API_BASE)
}

fn env_or(name: &str, default: &str) -> String {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => default.to_string(),
    }
}

pub struct ReleaseClient {
    client: Client,
    api_base: String,
    repo: String,
    asset: AssetTarget,
}

impl ReleaseClient {
    pub fn new(api_base: &str, repo: &str, asset: AssetTarget) -> Result<Self, UpdateError> {
        let client = build_client()
            .map_err(|err| UpdateError::check_failed(format!("build HTTP client: {err}")))?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            repo: repo.to_string(),
            asset,
        })
    }

    /// Feed location from `WINTERPACK_UPDATE_API` / `WINTERPACK_UPDATE_REPO`,
    /// asset for the running platform.
    pub fn from_env() -> Result<Self, UpdateError> {
        Self::new(&resolve_api_base(), &resolve_repo(), AssetTarget::current())
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// One bounded request. Nothing is retried here; a timeout comes back
    /// as a retryable [`UpdateError::UpdateCheckFailed`].
    pub async fn fetch_latest(
        &self,
        channel: Channel,
        timeout: Duration,
    ) -> Result<ReleaseInfo, UpdateError> {
        match tokio::time::timeout(timeout, self.fetch_latest_unbounded(channel)).await {
            Ok(result) => result,
            Err(_) => Err(UpdateError::check_timed_out(format!(
                "release feed did not answer within {}s",
                timeout.as_secs_f32()
            ))),
        }
    }

    async fn fetch_latest_unbounded(&self, channel: Channel) -> Result<ReleaseInfo, UpdateError> {
        let url = format!(
            "{}/repos/{}/releases?per_page={RELEASES_PER_PAGE}",
            self.api_base, self.repo
        );
        debug!(url = %url, channel = channel.as_str(), "fetching release feed");
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|err| request_failure(&err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::UpdateCheckFailed {
                cause: format!("release feed returned HTTP {status}"),
                retryable: is_retryable(status) || status.is_server_error(),
            });
        }
        let releases: Vec<ReleaseItem> = response.json().await.map_err(|err| {
            if err.is_decode() {
                UpdateError::check_failed(format!("malformed release feed: {err}"))
            } else {
                request_failure(&err)
            }
        })?;

        let release = select_release(&releases, channel).ok_or_else(|| {
            UpdateError::check_failed(format!(
                "no {} release published for {}",
                channel.as_str(),
                self.repo
            ))
        })?;
        let asset = self.asset.select(&release.assets).ok_or_else(|| {
            UpdateError::check_failed(format!(
                "release {} has no asset for {}",
                release.tag_name, self.asset.name
            ))
        })?;

        let info = ReleaseInfo {
            version: Version::parse(&release.tag_name),
            tag: release.tag_name.clone(),
            asset_url: asset.browser_download_url.clone(),
            asset_name: asset.name.clone(),
            sha256: asset.sha256().map(normalize_sha256),
            size: asset.size,
        };
        info!(
            channel = channel.as_str(),
            tag = %info.tag,
            asset = %info.asset_name,
            has_digest = info.sha256.is_some(),
            "latest release resolved"
        );
        Ok(info)
    }
}

fn request_failure(err: &reqwest::Error) -> UpdateError {
    if err.is_timeout() {
        return UpdateError::check_timed_out(format!("release feed timed out: {err}"));
    }
    UpdateError::UpdateCheckFailed {
        cause: format!("release feed unreachable: {err}"),
        retryable: is_network_error(err),
    }
}

/// Stable: newest published release that is neither a pre-release nor a dev
/// tag. Dev: newest published release of any kind.
pub(crate) fn select_release(releases: &[ReleaseItem], channel: Channel) -> Option<&ReleaseItem> {
    releases
        .iter()
        .filter(|release| !release.draft)
        .find(|release| match channel {
            Channel::Dev => true,
            Channel::Stable => {
                !release.prerelease && !Version::parse(&release.tag_name).is_dev_build()
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use wiremock::matchers::{header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const REPO: &str = "winterpack/winterpack-launcher";

    fn feed() -> Value {
        json!([
            {
                "tag_name": "v1.4.0-draft",
                "draft": true,
                "prerelease": false,
                "assets": []
            },
            {
                "tag_name": "v1.3.1-dev.abc123",
                "draft": false,
                "prerelease": true,
                "assets": [{
                    "name": "winterpack-linux-x86_64",
                    "browser_download_url": "https://downloads.example/dev/winterpack-linux-x86_64"
                }]
            },
            {
                "tag_name": "v1.3.0",
                "draft": false,
                "prerelease": false,
                "assets": [
                    {
                        "name": "winterpack-windows-x86_64.exe",
                        "browser_download_url": "https://downloads.example/1.3.0/winterpack-windows-x86_64.exe"
                    },
                    {
                        "name": "winterpack-linux-x86_64",
                        "browser_download_url": "https://downloads.example/1.3.0/winterpack-linux-x86_64",
                        "size": 1024,
                        "digest": "sha256:ABCDEF"
                    }
                ]
            }
        ])
    }

    fn client_for(server: &MockServer) -> ReleaseClient {
        ReleaseClient::new(
            &server.uri(),
            REPO,
            AssetTarget::for_platform(Os::Linux, "x86_64"),
        )
        .unwrap()
    }

    async fn serve(server: &MockServer, template: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(format!("/repos/{REPO}/releases")))
            .respond_with(template)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn stable_channel_skips_dev_and_draft_releases() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/repos/{REPO}/releases")))
            .and(query_param("per_page", "30"))
            .and(header_exists("user-agent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(feed()))
            .mount(&server)
            .await;

        let info = client_for(&server)
            .fetch_latest(Channel::Stable, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(info.tag, "v1.3.0");
        assert_eq!(info.version, Version::parse("1.3.0"));
        assert_eq!(info.asset_name, "winterpack-linux-x86_64");
        assert_eq!(info.sha256.as_deref(), Some("abcdef"));
        assert_eq!(info.size, Some(1024));
    }

    #[tokio::test]
    async fn dev_channel_takes_newest_build() {
        let server = MockServer::start().await;
        serve(&server, ResponseTemplate::new(200).set_body_json(feed())).await;
        let info = client_for(&server)
            .fetch_latest(Channel::Dev, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(info.tag, "v1.3.1-dev.abc123");
        assert!(info.version.is_dev_build());
        assert_eq!(info.sha256, None);
    }

    #[tokio::test]
    async fn server_errors_are_reported_as_check_failures() {
        let server = MockServer::start().await;
        serve(&server, ResponseTemplate::new(404)).await;
        let err = client_for(&server)
            .fetch_latest(Channel::Stable, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::UpdateCheckFailed { retryable: false, .. }));
    }

    #[tokio::test]
    async fn throttling_is_retryable() {
        let server = MockServer::start().await;
        serve(&server, ResponseTemplate::new(503)).await;
        let err = client_for(&server)
            .fetch_latest(Channel::Stable, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn malformed_feed_is_a_check_failure() {
        let server = MockServer::start().await;
        serve(&server, ResponseTemplate::new(200).set_body_string("<html>")).await;
        let err = client_for(&server)
            .fetch_latest(Channel::Stable, Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            UpdateError::UpdateCheckFailed { cause, retryable } => {
                assert!(cause.contains("malformed"), "{cause}");
                assert!(!retryable);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_feed_times_out_as_retryable() {
        let server = MockServer::start().await;
        serve(
            &server,
            ResponseTemplate::new(200)
                .set_body_json(feed())
                .set_delay(Duration::from_secs(2)),
        )
        .await;
        let err = client_for(&server)
            .fetch_latest(Channel::Stable, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::UpdateCheckFailed { retryable: true, .. }));
    }

    #[tokio::test]
    async fn missing_platform_asset_is_reported() {
        let server = MockServer::start().await;
        serve(
            &server,
            ResponseTemplate::new(200).set_body_json(json!([{
                "tag_name": "v2.0.0",
                "assets": [{ "name": "winterpack-windows-x86_64.exe", "browser_download_url": "u" }]
            }])),
        )
        .await;
        let err = client_for(&server)
            .fetch_latest(Channel::Stable, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no asset"));
    }

    #[test]
    fn asset_names_per_platform() {
        assert_eq!(
            AssetTarget::for_platform(Os::Windows, "x86_64").name,
            "winterpack-windows-x86_64.exe"
        );
        assert_eq!(
            AssetTarget::for_platform(Os::MacOs, "aarch64").name,
            "winterpack-macos-universal"
        );
        assert_eq!(
            AssetTarget::for_platform(Os::Linux, "aarch64").name,
            "winterpack-linux-aarch64"
        );
    }

    #[test]
    fn loose_asset_match_is_a_fallback() {
        let assets = vec![
            AssetItem {
                name: "Winterpack-Linux-AARCH64".into(),
                browser_download_url: "arm".into(),
                size: None,
                digest: None,
            },
            AssetItem {
                name: "Winterpack-Linux-x86_64.AppImage".into(),
                browser_download_url: "x86".into(),
                size: None,
                digest: None,
            },
        ];
        let target = AssetTarget::for_platform(Os::Linux, "x86_64");
        assert_eq!(target.select(&assets).unwrap().browser_download_url, "x86");
        let windows = AssetTarget::for_platform(Os::Windows, "x86_64");
        assert!(windows.select(&assets).is_none());
    }
}
