//! Content moderation gateway
//!
//! Classifies report descriptions through an external moderation API before
//! anything is persisted. The gateway fails closed: content whose safety
//! cannot be determined is never allowed through.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::ModerationConfig;
use crate::error::ModerationError;

/// Verdict from a completed moderation call. Transient; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModerationVerdict {
    pub allowed: bool,
    pub flagged: bool,
    /// First triggered category, when the response enumerates categories.
    pub category: Option<String>,
}

impl ModerationVerdict {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            flagged: false,
            category: None,
        }
    }

    pub fn reject(category: Option<String>) -> Self {
        Self {
            allowed: false,
            flagged: true,
            category,
        }
    }
}

/// Seam between the submission pipeline and the external classifier, so the
/// pipeline can be exercised with injected fakes.
#[async_trait]
pub trait ContentModeration: Send + Sync {
    async fn check(&self, text: &str) -> Result<ModerationVerdict, ModerationError>;
}

/// Backoff schedule for transient moderation failures.
///
/// One attempt is made per schedule slot plus the initial call, so the default
/// two-entry schedule yields three attempts total. The whole sequence shares a
/// single end-to-end deadline.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub delays: Vec<Duration>,
    pub overall_deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delays: vec![Duration::from_secs(1), Duration::from_secs(3)],
            overall_deadline: Duration::from_secs(40),
        }
    }
}

/// Moderation client for the OpenAI moderations endpoint.
pub struct OpenAiModeration {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    policy: RetryPolicy,
}

impl OpenAiModeration {
    /// Build a client. A missing or blank credential is a configuration error
    /// raised here, before any network attempt.
    pub fn new(
        config: &ModerationConfig,
        api_key: Option<String>,
    ) -> Result<Self, ModerationError> {
        let api_key = api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or(ModerationError::MissingCredential)?;

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
            policy: RetryPolicy {
                overall_deadline: Duration::from_secs(config.timeout_secs),
                ..RetryPolicy::default()
            },
        })
    }

    /// Replace the retry schedule; tests shrink the delays.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[async_trait]
impl ContentModeration for OpenAiModeration {
    async fn check(&self, text: &str) -> Result<ModerationVerdict, ModerationError> {
        // Empty input has nothing to classify.
        if text.trim().is_empty() {
            return Ok(ModerationVerdict::allow());
        }

        let deadline = Instant::now() + self.policy.overall_deadline;
        let max_attempts = self.policy.delays.len() + 1;
        let mut last_status = 0u16;

        for attempt in 1..=max_attempts {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ModerationError::DeadlineExceeded);
            }

            debug!(attempt, "moderation request");

            let response = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .timeout(remaining)
                .json(&json!({ "model": self.model, "input": text }))
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        ModerationError::DeadlineExceeded
                    } else {
                        ModerationError::Transport(e)
                    }
                })?;

            let status = response.status();
            debug!(attempt, status = status.as_u16(), "moderation response");

            if status.is_success() {
                let body: ModerationResponse = response
                    .json()
                    .await
                    .map_err(|e| ModerationError::MalformedResponse(e.to_string()))?;
                return verdict_from_response(body);
            }

            last_status = status.as_u16();
            let retryable = last_status == 429 || status.is_server_error();

            if retryable && attempt < max_attempts {
                // If the server tells us how long to wait, respect it.
                let delay = retry_after(response.headers())
                    .unwrap_or(self.policy.delays[attempt - 1]);

                warn!(
                    attempt,
                    status = last_status,
                    delay_ms = delay.as_millis() as u64,
                    "transient moderation failure, retrying"
                );

                if delay >= deadline.saturating_duration_since(Instant::now()) {
                    return Err(ModerationError::DeadlineExceeded);
                }
                tokio::time::sleep(delay).await;
                continue;
            }

            if retryable {
                return Err(ModerationError::RetriesExhausted {
                    status: last_status,
                });
            }

            let body = response.text().await.unwrap_or_default();
            return Err(ModerationError::Terminal {
                status: last_status,
                body,
            });
        }

        Err(ModerationError::RetriesExhausted {
            status: last_status,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ModerationResponse {
    results: Vec<ModerationResult>,
}

#[derive(Debug, Deserialize)]
struct ModerationResult {
    flagged: bool,
    #[serde(default)]
    categories: BTreeMap<String, serde_json::Value>,
}

fn verdict_from_response(body: ModerationResponse) -> Result<ModerationVerdict, ModerationError> {
    let first = body
        .results
        .into_iter()
        .next()
        .ok_or_else(|| ModerationError::MalformedResponse("empty results".to_string()))?;

    if !first.flagged {
        return Ok(ModerationVerdict::allow());
    }

    let category = first
        .categories
        .into_iter()
        .find(|(_, triggered)| triggered.as_bool() == Some(true))
        .map(|(name, _)| name);

    Ok(ModerationVerdict::reject(category))
}

/// Retry-After can be seconds or a date; the seconds form is handled.
fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    let value = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;
    value.parse::<u64>().ok().map(Duration::from_secs)
}
