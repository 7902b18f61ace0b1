//! HTTP retry helpers for transient errors.
//!
//! Fetchers should go through [`send_text`] instead of calling
//! `reqwest::RequestBuilder::send()` directly, so every request gets
//! bounded retries with exponential backoff on timeouts, connection
//! resets, HTTP 429 and HTTP 5xx.
//!
//! ```ignore
//! let html = retry::send_text(|| client.get(&url), &policy).await?;
//! ```

use std::time::Duration;

use crate::ScrapeError;

/// Maximum length of the response body preview included in error logs.
const BODY_PREVIEW_LEN: usize = 200;

/// How often and how patiently a request is retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retry attempts after the first try.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each following one.
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        self.base_backoff
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
    }
}

/// Sends an HTTP request and returns the response body as a `String`.
///
/// The `build_request` closure is called on each attempt to construct a
/// fresh [`reqwest::RequestBuilder`] (since builders are consumed by
/// `.send()`).
///
/// A body that fails to arrive completely is re-fetched through the same
/// retry loop, sharing its attempt budget.
///
/// Does **not** retry HTTP 4xx (except 429).
///
/// # Errors
///
/// Returns [`ScrapeError`] if the request fails after all retries or the
/// server returns a non-retryable status code.
#[allow(clippy::future_not_send)]
pub async fn send_text<F>(build_request: F, policy: &RetryPolicy) -> Result<String, ScrapeError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0;
    loop {
        let response = send_inner(&build_request, policy, &mut attempt).await?;
        let url = response.url().to_string();

        match response.text().await {
            Ok(text) => {
                log::trace!(
                    "{url}: {} bytes, starts with {:?}",
                    text.len(),
                    text.chars().take(BODY_PREVIEW_LEN).collect::<String>()
                );
                return Ok(text);
            }
            Err(e) if attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.delay(attempt);
                log::warn!(
                    "Body read failed for {url} (retry {attempt}/{}), re-fetching in {delay:?}: {e}",
                    policy.max_retries
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                log::error!("Body read failed for {url}, giving up: {e}");
                return Err(ScrapeError::Http(e));
            }
        }
    }
}

/// Core retry loop behind [`send_text`].
///
/// Returns the successful [`reqwest::Response`] (status 2xx or 3xx).
/// `attempt` is shared with the caller so body re-fetches count against
/// the same budget.
#[allow(clippy::future_not_send)]
async fn send_inner<F>(
    build_request: &F,
    policy: &RetryPolicy,
    attempt: &mut u32,
) -> Result<reqwest::Response, ScrapeError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    loop {
        let result = build_request().send().await;
        let can_retry = *attempt < policy.max_retries;

        match result {
            Err(e) => {
                if !(is_transient(&e) && can_retry) {
                    return Err(ScrapeError::Http(e));
                }
                log::warn!("  transient error: {e}");
            }
            Ok(response) => {
                let status = response.status();
                let url = response.url().to_string();

                // 429 and 5xx are worth another try; other 4xx are permanent.
                let retryable = status == reqwest::StatusCode::TOO_MANY_REQUESTS
                    || status.is_server_error();

                if retryable && can_retry {
                    log::warn!("  HTTP {status} from {url}");
                } else if retryable || status.is_client_error() {
                    return Err(ScrapeError::Status {
                        url,
                        status: status.as_u16(),
                    });
                } else {
                    return Ok(response);
                }
            }
        }

        *attempt += 1;
        let delay = policy.delay(*attempt);
        log::warn!("  retry {}/{} in {delay:?}...", *attempt, policy.max_retries);
        tokio::time::sleep(delay).await;
    }
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_decode() || e.is_request()
}
