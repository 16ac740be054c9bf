//! Blocking HTTP client with bounded retries
//!
//! Every network touchpoint in the pipeline (Debian index, snapshot API,
//! source downloads, NVD feeds) goes through this wrapper: explicit
//! timeout, three attempts with exponential backoff and jitter, and a
//! clean split between retryable transport errors and permanent 4xx
//! responses.

use std::time::Duration;

use rand::Rng;
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;

use crate::{A4fError, A4fResult};

const HTTP_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_RETRIES: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 1000;

/// Whether an error is worth another attempt.
fn is_retryable(err: &A4fError) -> bool {
    matches!(err, A4fError::Network(_) | A4fError::ServiceUnavailable(_))
}

/// Run `op` up to [`MAX_RETRIES`] times with exponential backoff + jitter.
pub fn with_retries<T, F>(what: &str, mut op: F) -> A4fResult<T>
where
    F: FnMut() -> A4fResult<T>,
{
    let mut last_err = None;
    for attempt in 0..MAX_RETRIES {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if is_retryable(&err) && attempt + 1 < MAX_RETRIES => {
                let jitter = rand::thread_rng().gen_range(0..250);
                let delay = RETRY_BASE_DELAY_MS * (1 << attempt) + jitter;
                tracing::warn!(
                    "{what}: attempt {}/{} failed ({err}), retrying in {delay}ms",
                    attempt + 1,
                    MAX_RETRIES
                );
                std::thread::sleep(Duration::from_millis(delay));
                last_err = Some(err);
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_err.unwrap_or_else(|| A4fError::Network(format!("{what}: retries exhausted"))))
}

pub struct HttpClient {
    inner: Client,
}

impl HttpClient {
    pub fn new() -> A4fResult<Self> {
        let inner = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(|e| A4fError::Network(format!("cannot build HTTP client: {e}")))?;
        Ok(HttpClient { inner })
    }

    fn get_once(&self, url: &str) -> A4fResult<Vec<u8>> {
        let response = self
            .inner
            .get(url)
            .send()
            .map_err(|e| A4fError::Network(format!("GET {url}: {e}")))?;
        let status = response.status();
        if status.is_success() {
            let bytes = response
                .bytes()
                .map_err(|e| A4fError::Network(format!("GET {url}: {e}")))?;
            return Ok(bytes.to_vec());
        }
        if status.is_server_error() {
            Err(A4fError::ServiceUnavailable(format!("GET {url}: HTTP {status}")))
        } else if status == reqwest::StatusCode::NOT_FOUND {
            Err(A4fError::NotFound(format!("GET {url}: HTTP 404")))
        } else {
            Err(A4fError::Network(format!("GET {url}: HTTP {status}")))
        }
    }

    /// GET with retries, returning the raw body.
    pub fn get_bytes(&self, url: &str) -> A4fResult<Vec<u8>> {
        with_retries(url, || self.get_once(url))
    }

    pub fn get_text(&self, url: &str) -> A4fResult<String> {
        let bytes = self.get_bytes(url)?;
        String::from_utf8(bytes).map_err(|_| A4fError::Network(format!("GET {url}: not UTF-8")))
    }

    pub fn get_json<T: DeserializeOwned>(&self, url: &str) -> A4fResult<T> {
        let bytes = self.get_bytes(url)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| A4fError::Network(format!("GET {url}: bad JSON: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn retries_stop_on_permanent_errors() {
        let calls = Cell::new(0u32);
        let result: A4fResult<()> = with_retries("probe", || {
            calls.set(calls.get() + 1);
            Err(A4fError::NotFound("nope".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn retries_exhaust_on_transient_errors() {
        let calls = Cell::new(0u32);
        let result: A4fResult<()> = with_retries("probe", || {
            calls.set(calls.get() + 1);
            Err(A4fError::Network("flaky".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), MAX_RETRIES);
    }

    #[test]
    fn success_passes_through() {
        let result = with_retries("probe", || Ok(42));
        assert_eq!(result.unwrap(), 42);
    }
}
