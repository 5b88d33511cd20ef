//! Blocking HTTP transport.
//!
//! Every request is bounded by the configured timeouts and retried with
//! exponential backoff on transport errors and 5xx responses. Client errors
//! (4xx) and local disk errors fail immediately. Index lookups and archive
//! downloads get separate whole-request limits, since a download spends
//! most of its time streaming the body.

use crate::config::NetworkPolicy;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::{Client, Response};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
#[error("{message}")]
pub struct FetchError {
    pub url: String,
    pub message: String,
    /// HTTP status when the server answered with a failure.
    pub status: Option<u16>,
    pub retryable: bool,
}

impl FetchError {
    /// Connection, timeout or body read failure.
    pub fn transport(url: &str, message: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            message: message.into(),
            status: None,
            retryable: true,
        }
    }

    /// Non-success HTTP status. Only server errors are retried.
    pub fn http(url: &str, status: u16) -> Self {
        Self {
            url: url.to_string(),
            message: format!("GET {url}: HTTP {status}"),
            status: Some(status),
            retryable: status >= 500,
        }
    }

    /// Failure on our side, e.g. writing the download to disk.
    pub fn local(url: &str, message: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            message: message.into(),
            status: None,
            retryable: false,
        }
    }
}

pub trait Fetcher {
    fn get_text(&self, url: &str) -> Result<String, FetchError>;
    /// Stream `url` into `out`, replacing anything already written. Returns
    /// the number of bytes written.
    fn download(&self, url: &str, out: &mut File) -> Result<u64, FetchError>;
}

pub struct HttpFetcher {
    client: Client,
    policy: NetworkPolicy,
    progress: bool,
}

impl HttpFetcher {
    pub fn new(policy: NetworkPolicy) -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(policy.connect_timeout)
            .user_agent(concat!("gvs/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::local("", format!("building HTTP client: {e}")))?;
        Ok(Self {
            client,
            policy,
            progress: true,
        })
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    fn with_retry<T>(
        &self,
        url: &str,
        mut attempt_fn: impl FnMut() -> Result<T, FetchError>,
    ) -> Result<T, FetchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match attempt_fn() {
                Ok(v) => return Ok(v),
                Err(e) if attempt < self.policy.attempts && e.retryable => {
                    let delay = backoff_delay(self.policy.backoff, attempt);
                    warn!(%url, attempt, error = %e, "request failed, retrying in {delay:?}");
                    std::thread::sleep(delay);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn send(&self, url: &str, timeout: Duration) -> Result<Response, FetchError> {
        debug!(%url, ?timeout, "GET");
        let resp = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .map_err(|e| FetchError::transport(url, format!("GET {url}: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::http(url, status.as_u16()));
        }
        Ok(resp)
    }

    fn progress_bar(&self, len: Option<u64>, url: &str) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let name = url.rsplit('/').next().unwrap_or(url).to_string();
        match len {
            Some(len) => {
                let pb = ProgressBar::new(len);
                if let Ok(style) = ProgressStyle::with_template(
                    "{msg} [{bar:30}] {bytes}/{total_bytes} ({bytes_per_sec})",
                ) {
                    pb.set_style(style.progress_chars("=> "));
                }
                pb.set_message(name);
                pb
            }
            None => {
                let pb = ProgressBar::new_spinner();
                if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} {bytes}") {
                    pb.set_style(style);
                }
                pb.set_message(name);
                pb
            }
        }
    }
}

impl Fetcher for HttpFetcher {
    fn get_text(&self, url: &str) -> Result<String, FetchError> {
        self.with_retry(url, || {
            self.send(url, self.policy.timeout)?
                .text()
                .map_err(|e| FetchError::transport(url, format!("reading body of {url}: {e}")))
        })
    }

    fn download(&self, url: &str, out: &mut File) -> Result<u64, FetchError> {
        self.with_retry(url, || {
            out.set_len(0)
                .and_then(|_| out.seek(SeekFrom::Start(0)).map(|_| ()))
                .map_err(|e| FetchError::local(url, format!("resetting temp file: {e}")))?;
            let mut resp = self.send(url, self.policy.download_timeout)?;
            let pb = self.progress_bar(resp.content_length(), url);
            let mut buf = [0u8; 64 * 1024];
            let mut written = 0u64;
            loop {
                let n = resp
                    .read(&mut buf)
                    .map_err(|e| FetchError::transport(url, format!("reading {url}: {e}")))?;
                if n == 0 {
                    break;
                }
                out.write_all(&buf[..n])
                    .map_err(|e| FetchError::local(url, format!("writing download: {e}")))?;
                written += n as u64;
                pb.set_position(written);
            }
            out.flush()
                .map_err(|e| FetchError::local(url, format!("flushing download: {e}")))?;
            pb.finish_and_clear();
            Ok(written)
        })
    }
}

/// `base * 2^(attempt-1)`, capped at 30s.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(Duration::from_secs(30))
}
