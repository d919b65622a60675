//! Fetching remote files with retry.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::error::PrepError;

const USER_AGENT: &str = "Mozilla/5.0";

/// Source of remote bytes.
///
/// Implementations must be shareable across download workers.
pub trait Fetcher: Sync {
    /// Stream the body at `url` into `out`, returning the bytes written.
    fn fetch(&self, url: &str, out: &mut dyn Write) -> Result<u64, PrepError>;
}

/// HTTP(S) fetcher backed by a `ureq` agent.
pub struct HttpFetcher {
    agent: ureq::Agent,
    timeout: Duration,
}

impl HttpFetcher {
    /// `timeout` bounds each phase up to the response headers (resolve,
    /// connect, send, receive headers). The body transfer is not capped, so
    /// large files on slow links still complete.
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_resolve(Some(timeout))
            .timeout_connect(Some(timeout))
            .timeout_send_request(Some(timeout))
            .timeout_recv_response(Some(timeout))
            .build();
        Self {
            agent: config.into(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, out: &mut dyn Write) -> Result<u64, PrepError> {
        let fetch_err = |message: String| PrepError::Fetch {
            url: url.to_string(),
            message,
        };

        let mut response = self
            .agent
            .get(url)
            .header("User-Agent", USER_AGENT)
            .call()
            .map_err(|source| fetch_err(source.to_string()))?;

        let mut reader = response.body_mut().as_reader();
        std::io::copy(&mut reader, out).map_err(|source| fetch_err(source.to_string()))
    }
}

/// Exponential backoff settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay after the first failure; doubles after each further failure.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after failed attempt number `attempt` (0-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }
}

/// Fetch `url` into a new file at `path`, retrying per `retry`.
///
/// On final failure the partially written file is removed.
pub fn fetch_to_file(
    fetcher: &dyn Fetcher,
    url: &str,
    path: &Path,
    retry: &RetryPolicy,
) -> Result<u64, PrepError> {
    let attempts = retry.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match fetch_once(fetcher, url, path) {
            Ok(bytes) => return Ok(bytes),
            Err(err) => {
                if path.exists() {
                    let _ = fs::remove_file(path);
                }
                if attempt + 1 >= attempts {
                    return Err(err);
                }
                let delay = retry.delay_after(attempt);
                debug!(
                    "Attempt {}/{} for {} failed ({}), retrying in {:?}",
                    attempt + 1,
                    attempts,
                    url,
                    err,
                    delay
                );
                thread::sleep(delay);
                attempt += 1;
            }
        }
    }
}

fn fetch_once(fetcher: &dyn Fetcher, url: &str, path: &Path) -> Result<u64, PrepError> {
    let file = File::create(path).map_err(PrepError::io_at(path))?;
    let mut writer = BufWriter::new(file);
    let bytes = fetcher.fetch(url, &mut writer)?;
    writer.flush().map_err(PrepError::io_at(path))?;
    Ok(bytes)
}
