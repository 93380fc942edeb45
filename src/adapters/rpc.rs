//! JSON-RPC transport with ordered endpoint failover
//!
//! Every request carries its own timeout. A transient failure (timeout,
//! transport error, 429, 5xx) moves the pool to the next configured
//! endpoint and retries immediately; after a full round of failures the
//! pool sleeps with jittered exponential backoff before the next round.
//! JSON-RPC error objects are returned to the caller without failover.

use rand::Rng;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crate::ports::chain::RpcError;

/// Default per-request timeout
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(5);

/// Retry/backoff settings shared by RPC pools and polling loops
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Full passes over the endpoint list before giving up
    pub max_rounds: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Random spread applied to each delay, 0.0 - 1.0
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_rounds: 2,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_rounds: u32, base_delay: Duration) -> Self {
        Self {
            max_rounds,
            base_delay,
            ..Default::default()
        }
    }

    /// Delay before retry number `attempt` (0-based), jittered
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.min(16)));
        jittered(exp.min(self.max_delay), self.jitter)
    }
}

/// Spread `delay` uniformly over `delay * (1 ± jitter)`
pub fn jittered(delay: Duration, jitter: f64) -> Duration {
    let jitter = jitter.clamp(0.0, 1.0);
    if jitter == 0.0 || delay.is_zero() {
        return delay;
    }
    let factor = rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter));
    delay.mul_f64(factor)
}

/// An ordered list of JSON-RPC endpoints for one chain
#[derive(Debug)]
pub struct RpcPool {
    label: String,
    endpoints: Vec<String>,
    current: AtomicUsize,
    http: Client,
    timeout: Duration,
    retry: RetryPolicy,
    next_id: AtomicU64,
}

impl RpcPool {
    pub fn new(
        label: impl Into<String>,
        endpoints: Vec<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, RpcError> {
        if endpoints.is_empty() {
            return Err(RpcError::Transport("no RPC endpoints configured".to_string()));
        }

        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        Ok(Self {
            label: label.into(),
            endpoints,
            current: AtomicUsize::new(0),
            http,
            timeout,
            retry,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Endpoint requests currently go to
    pub fn current_endpoint(&self) -> &str {
        &self.endpoints[self.current.load(Ordering::Relaxed) % self.endpoints.len()]
    }

    /// Issue a JSON-RPC request, failing over across endpoints
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let n = self.endpoints.len();
        let mut attempts = 0u32;
        let mut last_error = None;

        for round in 0..self.retry.max_rounds.max(1) {
            for _ in 0..n {
                let idx = self.current.load(Ordering::Relaxed) % n;
                let url = &self.endpoints[idx];
                attempts += 1;

                match self.send_once(url, method, &params).await {
                    Ok(result) => return Ok(result),
                    Err(e) if e.is_transient() => {
                        self.fail_over(idx);
                        tracing::warn!(
                            "[{}] {} failed on {}: {} - failing over to {}",
                            self.label,
                            method,
                            url,
                            e,
                            self.current_endpoint()
                        );
                        last_error = Some(e);
                    }
                    Err(e) => return Err(e),
                }
            }

            if round + 1 < self.retry.max_rounds {
                let backoff = self.retry.backoff(round);
                tracing::debug!(
                    "[{}] all endpoints failed for {}, backing off {:?}",
                    self.label,
                    method,
                    backoff
                );
                tokio::time::sleep(backoff).await;
            }
        }

        Err(RpcError::Exhausted {
            attempts,
            last: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempt made".to_string()),
        })
    }

    /// Advance past `failed_idx` unless another task already did
    fn fail_over(&self, failed_idx: usize) {
        let next = (failed_idx + 1) % self.endpoints.len();
        let _ = self.current.compare_exchange(
            failed_idx,
            next,
            Ordering::Relaxed,
            Ordering::Relaxed,
        );
    }

    async fn send_once(&self, url: &str, method: &str, params: &Value) -> Result<Value, RpcError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });

        let call = async {
            let response = self
                .http
                .post(url)
                .json(&body)
                .send()
                .await
                .map_err(|e| map_reqwest_error(e, self.timeout))?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(RpcError::RateLimited);
            }
            if !status.is_success() {
                return Err(RpcError::HttpStatus(status.as_u16()));
            }

            response
                .json::<Value>()
                .await
                .map_err(|e| RpcError::Parse(e.to_string()))
        };

        let envelope = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| RpcError::Timeout(self.timeout))??;

        parse_envelope(envelope)
    }
}

fn map_reqwest_error(e: reqwest::Error, timeout: Duration) -> RpcError {
    if e.is_timeout() {
        RpcError::Timeout(timeout)
    } else {
        RpcError::Transport(e.to_string())
    }
}

/// Split a JSON-RPC response into result or error
pub fn parse_envelope(envelope: Value) -> Result<Value, RpcError> {
    if let Some(error) = envelope.get("error").filter(|e| !e.is_null()) {
        return Err(RpcError::Rpc {
            code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        });
    }

    envelope
        .get("result")
        .cloned()
        .ok_or_else(|| RpcError::Parse("response has neither result nor error".to_string()))
}
