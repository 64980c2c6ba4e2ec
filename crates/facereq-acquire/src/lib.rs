//! facereq-acquire — Reference-image acquisition.
//!
//! Downloads one reference image per identity into a directory, skipping
//! files that already exist, retrying transient failures a bounded number
//! of times with a fixed backoff, and pacing successful requests so the
//! remote host is not hammered. A batch tolerates per-identity failure:
//! one identity's exhausted retries never abort the others.

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(5);
/// Minimum spacing observed after each successful download.
const DEFAULT_REQUEST_SPACING: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("could not write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// What a single `fetch` call did.
#[derive(Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    Downloaded(PathBuf),
    /// The file was already on disk; no network call was made.
    AlreadyPresent(PathBuf),
}

/// Outcome of a batch fetch. Failures are recorded, never raised.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub downloaded: Vec<String>,
    pub already_present: Vec<String>,
    pub failed: Vec<String>,
}

/// Retry an async operation up to `max_attempts` times with a fixed
/// `backoff` between attempts, returning the last error on exhaustion.
///
/// Every failure is treated as transient; distinguishing permanent
/// failures (e.g., 404) is a known limitation of the policy.
pub async fn retry_fixed<T, E, F, Fut>(
    max_attempts: u32,
    backoff: Duration,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts => {
                tracing::warn!(attempt, error = %err, "attempt failed, backing off");
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Idempotent, retrying image downloader.
pub struct Fetcher {
    client: reqwest::Client,
    max_attempts: u32,
    backoff: Duration,
    spacing: Duration,
}

impl Fetcher {
    /// Fetcher with the default policy: 3 attempts, 5s backoff, 2s spacing.
    pub fn new() -> Self {
        Self::with_policy(
            DEFAULT_MAX_ATTEMPTS,
            DEFAULT_RETRY_BACKOFF,
            DEFAULT_REQUEST_SPACING,
        )
    }

    pub fn with_policy(max_attempts: u32, backoff: Duration, spacing: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            max_attempts,
            backoff,
            spacing,
        }
    }

    /// Fetch the reference image for `identity` into `dest_dir`.
    ///
    /// If `dest_dir/<identity>.jpg` already exists the call returns
    /// immediately without touching the network. On success the configured
    /// inter-request spacing is observed before returning control.
    pub async fn fetch(
        &self,
        identity: &str,
        url: &str,
        dest_dir: &Path,
    ) -> Result<FetchOutcome, FetchError> {
        let path = dest_dir.join(format!("{identity}.jpg"));
        if path.exists() {
            tracing::debug!(identity, path = %path.display(), "already downloaded");
            return Ok(FetchOutcome::AlreadyPresent(path));
        }

        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|source| FetchError::Io {
                path: dest_dir.to_path_buf(),
                source,
            })?;

        tracing::info!(identity, url, "downloading");
        retry_fixed(self.max_attempts, self.backoff, || {
            self.fetch_once(url, &path)
        })
        .await?;

        tracing::info!(identity, path = %path.display(), "downloaded");
        tokio::time::sleep(self.spacing).await;
        Ok(FetchOutcome::Downloaded(path))
    }

    async fn fetch_once(&self, url: &str, path: &Path) -> Result<(), FetchError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }
        let bytes = response.bytes().await?;

        // Stage into a sibling file and rename on success, so a write that
        // dies partway (disk full, for instance) can never leave a file at
        // the final name for the idempotency check to trust.
        let staging = path.with_extension("part");
        if let Err(source) = tokio::fs::write(&staging, &bytes).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(FetchError::Io { path: staging, source });
        }
        tokio::fs::rename(&staging, path)
            .await
            .map_err(|source| FetchError::Io {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Fetch every `(identity, url)` pair into `dest_dir`.
    ///
    /// A single identity's failure after exhausted retries is logged and
    /// recorded in the report; it never aborts the rest of the batch.
    pub async fn fetch_all(
        &self,
        roster: &[(String, String)],
        dest_dir: &Path,
    ) -> FetchReport {
        let mut report = FetchReport::default();

        for (identity, url) in roster {
            match self.fetch(identity, url, dest_dir).await {
                Ok(FetchOutcome::Downloaded(_)) => report.downloaded.push(identity.clone()),
                Ok(FetchOutcome::AlreadyPresent(_)) => {
                    report.already_present.push(identity.clone())
                }
                Err(err) => {
                    tracing::error!(
                        identity = %identity,
                        error = %err,
                        attempts = self.max_attempts,
                        "download failed after all attempts"
                    );
                    report.failed.push(identity.clone());
                }
            }
        }

        tracing::info!(
            downloaded = report.downloaded.len(),
            already_present = report.already_present.len(),
            failed = report.failed.len(),
            "fetch batch complete"
        );
        report
    }
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn instant_fetcher(max_attempts: u32) -> Fetcher {
        Fetcher::with_policy(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    #[tokio::test]
    async fn retry_returns_first_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = retry_fixed(3, Duration::ZERO, || {
            let calls = &calls;
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_recovers_from_transient_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = retry_fixed(3, Duration::ZERO, || {
            let calls = &calls;
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(format!("transient {n}"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_exhausts_and_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = retry_fixed(3, Duration::ZERO, || {
            let calls = &calls;
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("still down".to_string())
            }
        })
        .await;

        assert_eq!(result.unwrap_err(), "still down");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fetch_is_idempotent_for_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("alice.jpg");
        std::fs::write(&existing, b"jpeg bytes").unwrap();

        // Unresolvable URL: the call must return before any network use.
        let fetcher = instant_fetcher(1);
        let outcome = fetcher
            .fetch("alice", "http://invalid.invalid/alice.jpg", dir.path())
            .await
            .unwrap();

        assert_eq!(outcome, FetchOutcome::AlreadyPresent(existing.clone()));
        assert_eq!(std::fs::read(existing).unwrap(), b"jpeg bytes");
    }

    #[tokio::test]
    async fn leftover_staging_file_does_not_satisfy_idempotency() {
        let dir = tempfile::tempdir().unwrap();
        // A crashed earlier run left a staged partial download behind.
        std::fs::write(dir.path().join("alice.part"), b"truncated").unwrap();

        let result = instant_fetcher(1)
            .fetch("alice", "not a url", dir.path())
            .await;

        // Only the final name counts: the fetch is attempted (and here
        // fails), rather than the partial file being reported as present.
        assert!(result.is_err());
        assert!(!dir.path().join("alice.jpg").exists());
    }

    #[tokio::test]
    async fn batch_tolerates_a_failing_identity() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("yara.jpg"), b"y").unwrap();
        std::fs::write(dir.path().join("zoe.jpg"), b"z").unwrap();

        let roster = vec![
            ("xavier".to_string(), "not a url".to_string()),
            ("yara".to_string(), "not a url".to_string()),
            ("zoe".to_string(), "not a url".to_string()),
        ];

        let report = instant_fetcher(3).fetch_all(&roster, dir.path()).await;

        assert_eq!(report.failed, ["xavier"]);
        assert_eq!(report.already_present, ["yara", "zoe"]);
        assert!(report.downloaded.is_empty());
    }
}
