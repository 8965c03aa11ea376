//! Artifact download with bounded retries.
//!
//! Every attempt streams into a fresh temp file next to the destination and
//! hashes while writing. The destination only ever appears by renaming a
//! complete, verified temp file; failed attempts drop theirs.

use reqwest::Client;
use sha2::{Digest, Sha256};
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use winterpack_core::UpdateError;
use winterpack_core::error::is_permission_denied;
use winterpack_core::fs_util::normalize_sha256;

use crate::http::{MAX_BACKOFF, backoff_delay, build_client, is_terminal, retry_delay_from_headers};

pub const DEFAULT_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadReport {
    pub sha256: String,
    pub bytes: u64,
    pub attempts: u32,
}

/// Why one attempt failed and whether another could help.
struct AttemptError {
    cause: String,
    retry_after: Option<Duration>,
    terminal: bool,
}

impl AttemptError {
    fn transient(cause: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
            retry_after: None,
            terminal: false,
        }
    }
}

enum Failure {
    Attempt(AttemptError),
    /// The destination directory cannot be written; retrying will not help.
    Io(UpdateError),
}

pub struct Downloader {
    client: Client,
    attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    timeout: Duration,
}

impl Downloader {
    pub fn new() -> Result<Self, UpdateError> {
        let client = build_client().map_err(|err| UpdateError::DownloadFailed {
            attempts: 0,
            cause: format!("build HTTP client: {err}"),
        })?;
        Ok(Self {
            client,
            attempts: DEFAULT_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: MAX_BACKOFF,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Longest wait between attempts, whatever the server asks for.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Deadline for a single attempt, connection through last byte.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn fetch(
        &self,
        url: &str,
        expected_hash: Option<&str>,
        dest: &Path,
    ) -> Result<DownloadReport, UpdateError> {
        let expected = expected_hash.map(normalize_sha256);
        let dest_dir = dest
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let mut last_cause = String::new();

        for attempt in 1..=self.attempts {
            debug!(url, attempt, "downloading");
            let outcome =
                match tokio::time::timeout(self.timeout, self.attempt(url, expected.as_deref(), dest_dir))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(Failure::Attempt(AttemptError::transient(format!(
                        "timed out after {}s",
                        self.timeout.as_secs_f32()
                    )))),
                };

            let err = match outcome {
                Ok((file, sha256, bytes)) => {
                    file.persist(dest)
                        .map_err(|err| io_failure("move download into place", dest_dir, err.error))?;
                    info!(url, bytes, attempt, dest = %dest.display(), "download complete");
                    return Ok(DownloadReport {
                        sha256,
                        bytes,
                        attempts: attempt,
                    });
                }
                Err(Failure::Io(err)) => return Err(err),
                Err(Failure::Attempt(err)) => err,
            };

            warn!(url, attempt, cause = %err.cause, "download attempt failed");
            last_cause = err.cause;
            if err.terminal {
                return Err(UpdateError::DownloadFailed {
                    attempts: attempt,
                    cause: last_cause,
                });
            }
            if attempt < self.attempts {
                let delay = err
                    .retry_after
                    .unwrap_or_else(|| backoff_delay(self.base_delay, attempt))
                    .min(self.max_delay);
                tokio::time::sleep(delay).await;
            }
        }

        Err(UpdateError::DownloadFailed {
            attempts: self.attempts,
            cause: last_cause,
        })
    }

    async fn attempt(
        &self,
        url: &str,
        expected: Option<&str>,
        dest_dir: &Path,
    ) -> Result<(NamedTempFile, String, u64), Failure> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| Failure::Attempt(AttemptError::transient(format!("request failed: {err}"))))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Failure::Attempt(AttemptError {
                cause: format!("HTTP {status}"),
                retry_after: retry_delay_from_headers(response.headers()),
                terminal: is_terminal(status),
            }));
        }

        let mut file = NamedTempFile::new_in(dest_dir)
            .map_err(|err| Failure::Io(io_failure("create temp file", dest_dir, err)))?;
        let mut hasher = Sha256::new();
        let mut bytes = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|err| Failure::Attempt(AttemptError::transient(format!("read body: {err}"))))?
        {
            hasher.update(&chunk);
            file.write_all(&chunk)
                .map_err(|err| Failure::Io(io_failure("write download", dest_dir, err)))?;
            bytes += chunk.len() as u64;
        }
        if bytes == 0 {
            return Err(Failure::Attempt(AttemptError::transient("empty response body")));
        }
        file.as_file()
            .sync_all()
            .map_err(|err| Failure::Io(io_failure("sync download", dest_dir, err)))?;

        let actual = hex::encode(hasher.finalize());
        if let Some(expected) = expected
            && actual != expected
        {
            return Err(Failure::Attempt(AttemptError::transient(format!(
                "sha256 mismatch: expected {expected}, got {actual}"
            ))));
        }
        Ok((file, actual, bytes))
    }
}

fn io_failure(action: &str, dir: &Path, err: io::Error) -> UpdateError {
    if is_permission_denied(&err) {
        return UpdateError::ElevationRequired {
            path: dir.to_path_buf(),
        };
    }
    UpdateError::DownloadFailed {
        attempts: 0,
        cause: format!("{action} in {}: {err}", dir.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BODY: &[u8] = b"winterpack 1.3.0 binary";

    fn sha256_hex(data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }

    fn downloader() -> Downloader {
        Downloader::new()
            .unwrap()
            .with_base_delay(Duration::from_millis(10))
            .with_timeout(Duration::from_secs(5))
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[tokio::test]
    async fn succeeds_on_third_attempt_after_two_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/asset"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/asset"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(BODY))
            .expect(1)
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("winterpack.new");
        let expected = sha256_hex(BODY);
        let report = downloader()
            .fetch(&format!("{}/asset", server.uri()), Some(&expected), &dest)
            .await
            .unwrap();

        assert_eq!(report.attempts, 3);
        assert_eq!(report.sha256, expected);
        assert_eq!(fs::read(&dest).unwrap(), BODY);
        assert_eq!(dir_entries(tmp.path()), vec!["winterpack.new".to_string()]);
    }

    #[tokio::test]
    async fn corrupted_body_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/asset"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"truncated".to_vec()))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/asset"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(BODY))
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("winterpack.new");
        let expected = format!("sha256:{}", sha256_hex(BODY).to_uppercase());
        let report = downloader()
            .fetch(&format!("{}/asset", server.uri()), Some(&expected), &dest)
            .await
            .unwrap();
        assert_eq!(report.attempts, 2);
        assert_eq!(fs::read(&dest).unwrap(), BODY);
    }

    #[tokio::test]
    async fn exhausted_attempts_leave_nothing_behind() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/asset"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("winterpack.new");
        let err = downloader()
            .fetch(&format!("{}/asset", server.uri()), None, &dest)
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::DownloadFailed { attempts: 3, .. }));
        assert!(err.is_retryable());
        assert!(dir_entries(tmp.path()).is_empty());
    }

    #[tokio::test]
    async fn long_retry_after_is_capped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/asset"))
            .respond_with(ResponseTemplate::new(503).insert_header("retry-after", "3600"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/asset"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(BODY))
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("winterpack.new");
        let dl = downloader()
            .with_timeout(Duration::from_secs(2))
            .with_max_delay(Duration::from_millis(50));
        let url = format!("{}/asset", server.uri());
        let fetch = dl.fetch(&url, None, &dest);
        let report = tokio::time::timeout(Duration::from_secs(5), fetch)
            .await
            .expect("retry delay was not capped")
            .unwrap();
        assert_eq!(report.attempts, 2);
        assert_eq!(fs::read(&dest).unwrap(), BODY);
    }

    #[tokio::test]
    async fn missing_asset_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/asset"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let err = downloader()
            .fetch(&format!("{}/asset", server.uri()), None, &tmp.path().join("out"))
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::DownloadFailed { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn empty_body_counts_as_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/asset"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("out");
        let err = downloader()
            .with_attempts(2)
            .fetch(&format!("{}/asset", server.uri()), None, &dest)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty"));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn slow_attempts_time_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/asset"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(BODY)
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("out");
        let err = downloader()
            .with_attempts(1)
            .with_timeout(Duration::from_millis(100))
            .fetch(&format!("{}/asset", server.uri()), None, &dest)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert!(err.is_retryable());
        assert!(dir_entries(tmp.path()).is_empty());
    }
}
