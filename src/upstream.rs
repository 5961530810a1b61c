use std::time::Duration;

use reqwest::StatusCode;
use tracing::debug;

use crate::error::ProviderError;

/// Fixed-backoff retry policy for transient transport failures. HTTP status
/// errors are never retried; they are classified by [`classify_status`].
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }
}

/// Send `builder`, retrying transport errors up to `retry.attempts` total
/// sends with a fixed delay between them.
pub async fn send_with_retry(
    builder: reqwest::RequestBuilder,
    retry: RetryPolicy,
) -> Result<reqwest::Response, ProviderError> {
    let attempts = retry.attempts.max(1);
    for attempt in 1..attempts {
        let Some(request) = builder.try_clone() else { break };
        match request.send().await {
            Ok(response) => return Ok(response),
            Err(err) => {
                debug!(attempt, error = %err, "upstream request failed, retrying");
                tokio::time::sleep(retry.delay).await;
            },
        }
    }
    builder.send().await.map_err(ProviderError::from)
}

/// Map an upstream HTTP status to the typed provider outcome.
pub fn classify_status(status: StatusCode) -> Result<(), ProviderError> {
    match status {
        StatusCode::UNAUTHORIZED => Err(ProviderError::Unauthorized),
        StatusCode::NOT_FOUND => Err(ProviderError::NotFound),
        status if !status.is_success() => {
            Err(ProviderError::Upstream(format!("upstream returned {status}")))
        },
        _ => Ok(()),
    }
}
