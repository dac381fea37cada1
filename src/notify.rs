//! Outbound webhook notification sink.
//!
//! Delivery is best-effort: a failed POST is logged and forgotten, never
//! allowed to fail the invocation that produced the findings.

use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

use crate::options::AuditOptions;

/// What a notification says about the cycle at the moment it fires.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub error_count: usize,
    pub accounts_scanned: usize,
    pub cycle_complete: bool,
    /// Where the result rows live, quoted verbatim in the message.
    pub results: String,
}

impl Notification {
    fn text(&self) -> String {
        let phase = if self.cycle_complete {
            "cycle complete"
        } else {
            "cycle in progress"
        };
        format!(
            "Link audit ({phase}): {} broken URL{} across {} account{} scanned, results in {}",
            self.error_count,
            if self.error_count == 1 { "" } else { "s" },
            self.accounts_scanned,
            if self.accounts_scanned == 1 { "" } else { "s" },
            self.results,
        )
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    text: String,
    #[serde(flatten)]
    notification: &'a Notification,
}

pub struct Notifier {
    client: reqwest::Client,
    webhook: String,
}

impl Notifier {
    /// Build a notifier when the options carry a non-empty webhook URL. The
    /// URL was already validated at options load.
    pub fn from_options(options: &AuditOptions) -> Option<Self> {
        let webhook = options.webhook_url.as_deref()?.trim();
        if webhook.is_empty() {
            return None;
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .ok()?;
        Some(Self {
            client,
            webhook: webhook.to_string(),
        })
    }

    /// POST the notification. Failures are logged, never propagated.
    pub async fn send(&self, notification: &Notification) {
        let payload = WebhookPayload {
            text: notification.text(),
            notification,
        };
        match self.client.post(&self.webhook).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                info!(errors = notification.error_count, "notification delivered");
            }
            Ok(response) => {
                warn!(status = %response.status(), "notification rejected by webhook");
            }
            Err(e) => {
                warn!(error = %e, "notification delivery failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_or_empty_webhook_disables_notifier() {
        let options = AuditOptions::default();
        assert!(Notifier::from_options(&options).is_none());

        let options = AuditOptions {
            webhook_url: Some("  ".into()),
            ..Default::default()
        };
        assert!(Notifier::from_options(&options).is_none());
    }

    #[test]
    fn test_message_text_counts_and_phase() {
        let note = Notification {
            error_count: 1,
            accounts_scanned: 3,
            cycle_complete: false,
            results: "./data/results.jsonl".into(),
        };
        assert_eq!(
            note.text(),
            "Link audit (cycle in progress): 1 broken URL across 3 accounts scanned, \
             results in ./data/results.jsonl"
        );

        let note = Notification {
            error_count: 12,
            accounts_scanned: 1,
            cycle_complete: true,
            results: "./data/results.jsonl".into(),
        };
        assert_eq!(
            note.text(),
            "Link audit (cycle complete): 12 broken URLs across 1 account scanned, \
             results in ./data/results.jsonl"
        );
    }

    #[test]
    fn test_payload_carries_structured_fields() {
        let note = Notification {
            error_count: 2,
            accounts_scanned: 5,
            cycle_complete: true,
            results: "./data/results.jsonl".into(),
        };
        let payload = WebhookPayload {
            text: note.text(),
            notification: &note,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["error_count"], 2);
        assert_eq!(json["cycle_complete"], true);
        assert!(json["text"].as_str().unwrap().contains("2 broken URLs"));
    }
}
