//! Request engine: runs one logical upstream call with backoff and credential rotation.
//!
//! Per logical call the engine moves through
//! `Send(credential) → Success | Transient → backoff → Send(same credential)
//! | QuotaExhausted → rotate → Send(next credential) | Fatal`.
//! Transient retries are delegated to [`with_retry_if`]; rotation happens
//! around it and stops after every credential has been tried once.

use crate::credentials::CredentialPool;
use crate::error::{Result, TranslateError, UpstreamError};
use crate::retry::{with_retry_if, RetryConfig};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Classification of a failed attempt.
#[derive(Debug)]
pub enum Failure {
    /// Retry the same credential after a backoff delay. When `quota` is set and
    /// the retry budget runs out, the credential is rotated instead of failing.
    Transient { error: UpstreamError, quota: bool },
    /// This credential cannot be used any more; rotate immediately.
    QuotaExhausted(UpstreamError),
    /// Terminal for this call; no retry, no rotation.
    Fatal(TranslateError),
}

impl Failure {
    pub fn transient(error: UpstreamError) -> Self {
        Failure::Transient {
            error,
            quota: false,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Failure::Transient { .. })
    }

    /// Map a reqwest error. Connection problems and timeouts are transient;
    /// undecodable bodies are transport errors.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Failure::Fatal(TranslateError::Transport(err.to_string()));
        }
        if err.is_builder() {
            return Failure::Fatal(TranslateError::UpstreamRequest(UpstreamError::new(
                None,
                None,
                err.to_string(),
            )));
        }
        Failure::transient(UpstreamError::new(
            err.status().map(|s| s.as_u16()),
            None,
            err.to_string(),
        ))
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Transient { error, .. } => write!(f, "transient failure: {}", error),
            Failure::QuotaExhausted(error) => write!(f, "credential quota exhausted: {}", error),
            Failure::Fatal(error) => write!(f, "{}", error),
        }
    }
}

/// A received upstream response body, decoded as JSON when possible.
#[derive(Debug)]
pub struct ResponseBody {
    pub status: u16,
    pub json: Option<serde_json::Value>,
    pub text: String,
}

impl ResponseBody {
    /// Read the whole response; a failure while reading the body is transient.
    pub async fn read(response: reqwest::Response) -> std::result::Result<Self, Failure> {
        let status = response.status().as_u16();
        let text = response.text().await.map_err(Failure::from_reqwest)?;
        let json = serde_json::from_str(&text).ok();
        Ok(Self { status, json, text })
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The decoded JSON, or a `TransportError` carrying the raw body.
    pub fn into_json(self) -> std::result::Result<serde_json::Value, Failure> {
        match self.json {
            Some(json) => Ok(json),
            None => Err(Failure::Fatal(TranslateError::Transport(self.text))),
        }
    }
}

/// Executes logical requests for one provider against its credential pool.
#[derive(Debug)]
pub struct RequestEngine {
    provider: String,
    pool: CredentialPool,
    retry: RetryConfig,
    timeout: Option<Duration>,
}

impl RequestEngine {
    pub fn new(provider: impl Into<String>, pool: CredentialPool) -> Self {
        Self {
            provider: provider.into(),
            pool,
            retry: RetryConfig::upstream_rate_limit(),
            timeout: None,
        }
    }

    /// Set the backoff used for transient failures
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Bound every single attempt; an elapsed attempt counts as transient.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Run one logical request.
    ///
    /// `send` issues a single attempt with the given credential and classifies
    /// the outcome. It may be called several times for one logical request.
    pub async fn execute<T, F, Fut>(&self, operation: &str, mut send: F) -> Result<T>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = std::result::Result<T, Failure>>,
    {
        let total = self.pool.len();
        let label = format!("{} {}", self.provider, operation);
        let mut tried = 0;

        loop {
            let (index, credential) = self.pool.current();
            let credential = credential.to_string();
            debug!("{}: sending with credential {}/{}", label, index + 1, total);

            let outcome = with_retry_if(
                &self.retry,
                &label,
                || self.attempt(send(credential.clone())),
                Failure::is_transient,
            )
            .await;

            let last = match outcome {
                Ok(value) => return Ok(value),
                Err(Failure::Fatal(e)) => return Err(e),
                Err(Failure::Transient {
                    error,
                    quota: false,
                }) => {
                    return Err(TranslateError::RetriesExhausted {
                        attempts: self.retry.effective_attempts(),
                        last: error,
                    })
                }
                Err(Failure::Transient { error, quota: true }) | Err(Failure::QuotaExhausted(error)) => {
                    error
                }
            };

            tried += 1;
            let next = self.pool.rotate_from(index);

            if tried >= total {
                warn!(
                    "{}: all {} credentials exhausted (last: {})",
                    label, total, last
                );
                return Err(TranslateError::AllCredentialsExhausted {
                    provider: self.provider.clone(),
                    credentials: total,
                    last,
                });
            }

            info!(
                "{}: credential {}/{} exhausted ({}), rotating to credential {}",
                label,
                index + 1,
                total,
                last,
                next + 1
            );
        }
    }

    async fn attempt<T, Fut>(&self, request: Fut) -> std::result::Result<T, Failure>
    where
        Fut: Future<Output = std::result::Result<T, Failure>>,
    {
        match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, request).await {
                Ok(outcome) => outcome,
                Err(_) => Err(Failure::transient(UpstreamError::new(
                    None,
                    None,
                    format!("request timed out after {:?}", limit),
                ))),
            },
            None => request.await,
        }
    }
}
