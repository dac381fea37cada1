//! Single-URL HTTP probing with bounded retry and multiplicative backoff.
//!
//! A probe produces either a numeric status code or the transport failure's
//! message text, never both. Rate-limit signals are absorbed locally with
//! backoff sleeps; quota exhaustion and a spent retry budget propagate as
//! named failures that abort the surrounding account scan.

use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

use crate::config::Config;
use crate::results::UrlCheckStatus;

/// Transport-level outcome classification for one fetch attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Too many requests in a short time; retryable with backoff.
    #[error("rate limited")]
    RateLimited,

    /// Daily request budget spent; not retryable this invocation.
    #[error("daily request quota exhausted")]
    QuotaExhausted,

    /// Any other transport failure; terminal for this URL, recorded as text.
    #[error("{0}")]
    Transport(String),
}

/// Muted-error HTTP fetch: 4xx/5xx responses come back as status codes, never
/// as errors.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<u16, FetchError>;
}

/// Failures that end an account scan early. Both leave already-gathered
/// results intact and are expected to be resumable on the next invocation.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeFailure {
    #[error("rate-limit retry budget exhausted")]
    QpsExhausted,

    #[error("daily request quota exhausted")]
    QuotaExhausted,
}

#[derive(Debug, Clone)]
pub struct ProbePolicy {
    pub init_sleep: Duration,
    pub backoff_factor: f64,
    pub max_tries: u32,
    /// Fixed delay after each successful request. Zero disables.
    pub throttle: Duration,
}

impl Default for ProbePolicy {
    fn default() -> Self {
        Self {
            init_sleep: Duration::from_millis(Config::INIT_SLEEP_MS),
            backoff_factor: Config::BACKOFF_FACTOR,
            max_tries: Config::MAX_TRIES,
            throttle: Duration::from_millis(Config::THROTTLE_MS),
        }
    }
}

/// Issues one bounded-retry, backoff-governed check for a single URL.
pub struct UrlProbe {
    fetcher: Arc<dyn Fetcher>,
    policy: ProbePolicy,
}

impl UrlProbe {
    pub fn new(fetcher: Arc<dyn Fetcher>, policy: ProbePolicy) -> Self {
        Self { fetcher, policy }
    }

    /// Check one concrete URL.
    ///
    /// Makes up to `max_tries` attempts, sleeping between rate-limited
    /// attempts with the sleep growing by `backoff_factor` each time. The
    /// backoff sleeps are local to this call and never block sibling tasks.
    pub async fn check(&self, url: &str) -> Result<UrlCheckStatus, ProbeFailure> {
        let mut backoff = self.policy.init_sleep;

        for attempt in 0..self.policy.max_tries {
            match self.fetcher.fetch(url).await {
                Ok(code) => {
                    if !self.policy.throttle.is_zero() {
                        sleep(self.policy.throttle).await;
                    }
                    return Ok(UrlCheckStatus::Code(code));
                }
                Err(FetchError::QuotaExhausted) => return Err(ProbeFailure::QuotaExhausted),
                Err(FetchError::Transport(message)) => {
                    return Ok(UrlCheckStatus::Message(message));
                }
                Err(FetchError::RateLimited) => {
                    // Sleep between attempts only; the final failed attempt
                    // surfaces immediately as QPS exhaustion.
                    if attempt + 1 < self.policy.max_tries {
                        sleep(backoff).await;
                        backoff = backoff.mul_f64(self.policy.backoff_factor);
                    }
                }
            }
        }

        Err(ProbeFailure::QpsExhausted)
    }
}

/// Production fetcher over reqwest with an optional daily request budget.
///
/// The budget models the host environment's daily fetch quota: once spent,
/// every further fetch classifies as `QuotaExhausted` without touching the
/// network. HTTP 429 from the target classifies as `RateLimited`.
pub struct HttpFetcher {
    client: reqwest::Client,
    daily_budget: Option<AtomicI64>,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, daily_budget: Option<i64>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(Config::REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(Config::CONNECT_TIMEOUT_SECS))
            .redirect(reqwest::redirect::Policy::limited(Config::MAX_REDIRECTS))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            daily_budget: daily_budget.map(AtomicI64::new),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<u16, FetchError> {
        if let Some(budget) = &self.daily_budget {
            if budget.fetch_sub(1, Ordering::Relaxed) <= 0 {
                return Err(FetchError::QuotaExhausted);
            }
        }

        match self.client.get(url).send().await {
            Ok(response) => {
                let code = response.status().as_u16();
                if code == 429 {
                    return Err(FetchError::RateLimited);
                }
                Ok(code)
            }
            Err(e) => Err(FetchError::Transport(e.to_string())),
        }
    }
}
