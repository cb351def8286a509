//! Notifier implementations.
//!
//! With `DOSSIER_NOTIFY_RELAY_URL` set, notices are POSTed as JSON to a mail
//! relay. Otherwise they are only logged.

use crate::config::NotifyConfig;
use crate::constants::NOTIFY_TIMEOUT_SECS;
use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use dossier_core::{Notification, Notifier};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Body sent to the relay.
#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: String,
    text: String,
    #[serde(flatten)]
    notification: &'a Notification,
}

/// Relays notices to an HTTP mail gateway. One attempt, no retries.
#[derive(Debug, Clone)]
pub struct HttpRelayNotifier {
    client: reqwest::Client,
    relay_url: String,
    from: String,
}

impl HttpRelayNotifier {
    pub fn new(relay_url: impl Into<String>, from: impl Into<String>) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(NOTIFY_TIMEOUT_SECS))
            .build()
            .map_err(|e| ApiError::internal_error(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            relay_url: relay_url.into(),
            from: from.into(),
        })
    }
}

#[async_trait]
impl Notifier for HttpRelayNotifier {
    async fn notify(&self, notification: &Notification) -> bool {
        let message = RelayMessage {
            from: &self.from,
            to: &notification.recipient,
            subject: notification.subject(),
            text: notification.body(),
            notification,
        };

        match self.client.post(&self.relay_url).json(&message).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(
                    recipient = %notification.recipient,
                    kind = %notification.kind,
                    "Notification relayed"
                );
                true
            }
            Ok(response) => {
                tracing::warn!(
                    recipient = %notification.recipient,
                    status = %response.status(),
                    "Notification relay rejected message"
                );
                false
            }
            Err(e) => {
                tracing::warn!(
                    recipient = %notification.recipient,
                    error = %e,
                    "Notification relay unreachable"
                );
                false
            }
        }
    }
}

/// Writes the notice to the log instead of sending it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> bool {
        tracing::info!(
            recipient = %notification.recipient,
            kind = %notification.kind,
            identifier = %notification.identifier,
            fields = notification.fields.len(),
            subject = %notification.subject(),
            "Notification (log only)"
        );
        true
    }
}

/// Pick the notifier for this configuration.
pub fn build_notifier(config: &NotifyConfig) -> ApiResult<Arc<dyn Notifier>> {
    match &config.relay_url {
        Some(url) => Ok(Arc::new(HttpRelayNotifier::new(url.clone(), config.from.clone())?)),
        None => Ok(Arc::new(LogNotifier)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dossier_core::QueryKind;

    #[tokio::test]
    async fn test_log_notifier_always_succeeds() {
        let notice =
            Notification::from_fields("a@b", QueryKind::AsyncFullProfile, "IT1", &Default::default());
        assert!(LogNotifier.notify(&notice).await);
    }

    #[tokio::test]
    async fn test_unreachable_relay_reports_failure() {
        let notifier = HttpRelayNotifier::new("http://127.0.0.1:9/relay", "dossier@test").unwrap();
        let notice =
            Notification::from_fields("a@b", QueryKind::AsyncNegativeCheck, "CF1", &Default::default());
        assert!(!notifier.notify(&notice).await);
    }

    #[test]
    fn test_relay_message_shape() {
        let notice =
            Notification::from_fields("ops@x", QueryKind::AsyncFullProfile, "IT1", &Default::default());
        let message = RelayMessage {
            from: "dossier@test",
            to: &notice.recipient,
            subject: notice.subject(),
            text: notice.body(),
            notification: &notice,
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["to"], "ops@x");
        assert_eq!(json["kind"], "company-full");
        assert_eq!(json["identifier"], "IT1");
    }
}
