//! Hook delivery: JSON POST with retry.

use std::time::Duration;

use serde_json::Value as JsonValue;
use tokio::time::sleep;
use tracing::warn;

/// Per-attempt request timeout.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);
/// Backoff before the first retry; doubles per attempt, exponent capped.
const BACKOFF_BASE: Duration = Duration::from_millis(200);
const BACKOFF_MAX_EXP: u32 = 5;

/// Thin wrapper over a shared `reqwest::Client` for hook posts.
pub struct HookClient {
    client: reqwest::Client,
}

impl Default for HookClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HookClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// POST `payload` to `url`, retrying transport errors and 5xx responses
    /// up to `retries` additional attempts with exponential backoff.
    ///
    /// Returns the final status code: 200/202 mean the hook accepted the
    /// delivery, any other code is surfaced to the execution record but not
    /// retried further. Exhausted transport errors report as 500. This
    /// never returns an error; delivery failures are recorded, not
    /// propagated.
    pub async fn post_with_retry(&self, payload: &JsonValue, url: &str, retries: u32) -> u16 {
        let mut attempt = 0u32;
        loop {
            let status = match self
                .client
                .post(url)
                .timeout(ATTEMPT_TIMEOUT)
                .json(payload)
                .send()
                .await
            {
                Ok(resp) => Some(resp.status().as_u16()),
                Err(e) => {
                    warn!(url = %url, attempt, error = %e, "hook post transport error");
                    None
                }
            };

            match status {
                Some(code) if !(500..=599).contains(&code) => {
                    if code != 200 && code != 202 {
                        warn!(url = %url, code, "hook post unexpected status");
                    }
                    return code;
                }
                _ => {
                    // Transport error or 5xx: retry until attempts run out.
                    if attempt >= retries {
                        return status.unwrap_or(500);
                    }
                }
            }

            sleep(BACKOFF_BASE * 2u32.pow(attempt.min(BACKOFF_MAX_EXP))).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::spawn_hook_sink;
    use serde_json::json;

    #[tokio::test]
    async fn successful_post_returns_200_after_one_attempt() {
        let sink = spawn_hook_sink(200).await;
        let client = HookClient::new();

        let status = client
            .post_with_retry(&json!({"k": "v"}), &sink.url(), 3)
            .await;

        assert_eq!(status, 200);
        assert_eq!(sink.hits(), 1);
        assert_eq!(sink.bodies()[0], json!({"k": "v"}));
    }

    #[tokio::test]
    async fn non_5xx_failures_are_not_retried() {
        let sink = spawn_hook_sink(404).await;
        let client = HookClient::new();

        let status = client.post_with_retry(&json!(1), &sink.url(), 3).await;

        assert_eq!(status, 404);
        assert_eq!(sink.hits(), 1);
    }

    #[tokio::test]
    async fn server_errors_are_retried_then_surfaced() {
        let sink = spawn_hook_sink(500).await;
        let client = HookClient::new();

        let status = client.post_with_retry(&json!(1), &sink.url(), 2).await;

        assert_eq!(status, 500);
        assert_eq!(sink.hits(), 3, "one attempt plus two retries");
    }

    #[tokio::test]
    async fn exhausted_transport_errors_report_500() {
        let client = HookClient::new();
        // Nothing listens on port 1.
        let status = client
            .post_with_retry(&json!(1), "http://127.0.0.1:1/hook", 1)
            .await;
        assert_eq!(status, 500);
    }

    #[tokio::test]
    async fn accepted_202_counts_as_success() {
        let sink = spawn_hook_sink(202).await;
        let client = HookClient::new();
        let status = client.post_with_retry(&json!(1), &sink.url(), 0).await;
        assert_eq!(status, 202);
        assert_eq!(sink.hits(), 1);
    }
}
