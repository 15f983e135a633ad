//! Completion webhook delivery: one POST per completed request, retried
//! with a bounded linear backoff.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mailcheck_store::{Store, VerificationObj};
use serde::Serialize;

use crate::error::WebhookError;

const MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Serialize)]
struct Payload<'a> {
    request_id: &'a str,
    status: &'static str,
    total_emails: u32,
    completed_emails: u32,
    results: &'a [VerificationObj],
    timestamp: DateTime<Utc>,
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(u64::from(attempt.saturating_mul(2)).min(10))
}

async fn post_once(client: &reqwest::Client, url: &str, payload: &Payload<'_>) -> Result<(), WebhookError> {
    let response = client
        .post(url)
        .json(payload)
        .send()
        .await
        .map_err(|e| WebhookError::Transport { url: url.to_string(), reason: e.to_string() })?;

    if response.status().is_success() {
        Ok(())
    } else {
        Err(WebhookError::NonSuccessStatus { url: url.to_string(), status: response.status().as_u16() })
    }
}

/// Delivers the completion webhook for `request_id`, retrying up to
/// [`MAX_ATTEMPTS`] times with a linear backoff capped at 10s. When
/// `response_url` is absent the request is marked sent without counting an
/// attempt, so nothing ever retries it.
pub async fn deliver(
    client: &reqwest::Client,
    store: &Arc<Store>,
    request_id: &str,
    response_url: Option<&str>,
    total_emails: u32,
    results: &[VerificationObj],
) {
    let Some(url) = response_url else {
        if let Err(e) = store.results_mark_webhook_skipped(request_id).await {
            tracing::warn!(request_id, error = %e, "failed to record skipped webhook");
        }
        return;
    };

    let payload = Payload {
        request_id,
        status: "completed",
        total_emails,
        completed_emails: results.len() as u32,
        results,
        timestamp: Utc::now(),
    };

    for attempt in 1..=MAX_ATTEMPTS {
        let outcome = post_once(client, url, &payload).await;
        let sent = outcome.is_ok();

        if let Err(e) = store.results_record_webhook_attempt(request_id, sent).await {
            tracing::warn!(request_id, error = %e, "failed to record webhook attempt");
        }

        match outcome {
            Ok(()) => {
                tracing::debug!(request_id, attempt, "webhook delivered");
                return;
            }
            Err(e) if attempt < MAX_ATTEMPTS => {
                tracing::debug!(request_id, attempt, error = %e, "webhook attempt failed, retrying");
                tokio::time::sleep(backoff(attempt)).await;
            }
            Err(e) => {
                tracing::warn!(request_id, attempt, error = %e, "webhook delivery exhausted retries");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_is_linear_and_capped() {
        assert_eq!(backoff(1), Duration::from_secs(2));
        assert_eq!(backoff(5), Duration::from_secs(10));
        assert_eq!(backoff(100), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_missing_url_marks_sent_without_attempt() {
        let store = Arc::new(Store::open_in_memory().await.unwrap());
        store.results_init("r1", 0, None).await.unwrap();

        let client = reqwest::Client::new();
        deliver(&client, &store, "r1", None, 0, &[]).await;

        let row = store.results_get("r1").await.unwrap().unwrap();
        assert!(row.webhook_sent);
        assert_eq!(row.webhook_attempts, 0);
    }
}
