use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use crate::source::FetchError;

const USER_AGENT: &str = concat!("cms-watch/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT_SECS: u64 = 10;
const PREVIEW_CHARS: usize = 200;

/// Exponential backoff: `min`, `2*min`, `4*min`, ... capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.min_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            min_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

pub fn is_transient_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    retry: RetryPolicy,
    app_token: Option<String>,
}

impl HttpFetcher {
    pub fn new(
        timeout: Duration,
        retry: RetryPolicy,
        app_token: Option<String>,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|source| FetchError::Client { source })?;
        Ok(Self {
            client,
            retry,
            app_token,
        })
    }

    pub async fn get_json(&self, url: &str, query: &[(String, String)]) -> Result<Value, FetchError> {
        let body = self.get_text(url, query).await?;
        serde_json::from_str(&body).map_err(|err| FetchError::Decode {
            url: url.to_string(),
            reason: err.to_string(),
        })
    }

    pub async fn get_text(&self, url: &str, query: &[(String, String)]) -> Result<String, FetchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.get_once(url, query).await {
                Ok(body) => return Ok(body),
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_after(attempt);
                    warn!(
                        "GET {url} failed (attempt {attempt}/{}): {err}; retrying in {:?}",
                        self.retry.max_attempts, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) if err.is_transient() => {
                    return Err(FetchError::Exhausted {
                        url: url.to_string(),
                        attempts: attempt,
                        last: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn get_once(&self, url: &str, query: &[(String, String)]) -> Result<String, FetchError> {
        let mut request = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(query);
        if let Some(token) = &self.app_token {
            request = request.header("X-App-Token", token);
        }
        debug!("GET {url} {query:?}");
        let response = request.send().await.map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;
        let status = response.status();
        let body = response.text().await.map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;
        if !status.is_success() {
            let preview: String = body.chars().take(PREVIEW_CHARS).collect();
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                preview,
            });
        }
        Ok(body)
    }
}
