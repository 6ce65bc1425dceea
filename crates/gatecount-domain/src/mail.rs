use crate::error::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tokio::sync::RwLock;

/// Outbound mail seam. Transport mechanics (SMTP, TLS, retries) live behind
/// this trait; `delay_until` asks the dispatcher to postpone the send.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailDispatcher: Send + Sync {
    async fn send(
        &self,
        recipients: &[String],
        subject: &str,
        body: &str,
        delay_until: Option<DateTime<Utc>>,
    ) -> DomainResult<()>;
}

/// Owns the alert/anomaly recipient lists and the no-disturb set, and
/// filters the latter out of every dispatch.
pub struct AlertMailer {
    dispatcher: std::sync::Arc<dyn MailDispatcher>,
    alert_recipients: Vec<String>,
    anomaly_recipients: Vec<String>,
    no_disturb: RwLock<HashSet<String>>,
}

impl AlertMailer {
    pub fn new(
        dispatcher: std::sync::Arc<dyn MailDispatcher>,
        alert_recipients: Vec<String>,
        anomaly_recipients: Vec<String>,
    ) -> Self {
        Self {
            dispatcher,
            alert_recipients,
            anomaly_recipients,
            no_disturb: RwLock::new(HashSet::new()),
        }
    }

    /// Operational alerts (device join/lost, cleanup reports).
    pub async fn broadcast_alert(&self, subject: &str, body: &str) -> DomainResult<()> {
        self.dispatch(&self.alert_recipients, subject, body, None)
            .await
    }

    /// Anomalous-activity alerts and recaps, optionally postponed.
    pub async fn broadcast_anomaly(
        &self,
        subject: &str,
        body: &str,
        delay_until: Option<DateTime<Utc>>,
    ) -> DomainResult<()> {
        self.dispatch(&self.anomaly_recipients, subject, body, delay_until)
            .await
    }

    /// Suppress mail to `recipient` until [`AlertMailer::unmute`].
    pub async fn mute(&self, recipient: &str) {
        self.no_disturb.write().await.insert(recipient.to_string());
    }

    pub async fn unmute(&self, recipient: &str) {
        self.no_disturb.write().await.remove(recipient);
    }

    async fn dispatch(
        &self,
        recipients: &[String],
        subject: &str,
        body: &str,
        delay_until: Option<DateTime<Utc>>,
    ) -> DomainResult<()> {
        let destinations: Vec<String> = {
            let muted = self.no_disturb.read().await;
            recipients
                .iter()
                .filter(|recipient| !muted.contains(*recipient))
                .cloned()
                .collect()
        };
        if destinations.is_empty() {
            return Ok(());
        }
        self.dispatcher
            .send(&destinations, subject, body, delay_until)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn alert_goes_to_alert_recipients() {
        let mut dispatcher = MockMailDispatcher::new();
        dispatcher
            .expect_send()
            .withf(|recipients, subject, _, delay| {
                recipients == ["ops@example.com".to_string()]
                    && subject == "Monitor Unit: LOST"
                    && delay.is_none()
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let mailer = AlertMailer::new(
            Arc::new(dispatcher),
            vec!["ops@example.com".to_string()],
            vec!["watch@example.com".to_string()],
        );

        mailer
            .broadcast_alert("Monitor Unit: LOST", "Monitoring Unit gate-a LOST")
            .await
            .expect("dispatched");
    }

    #[tokio::test]
    async fn muted_recipients_are_filtered() {
        let mut dispatcher = MockMailDispatcher::new();
        dispatcher
            .expect_send()
            .withf(|recipients, _, _, _| recipients == ["b@example.com".to_string()])
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let mailer = AlertMailer::new(
            Arc::new(dispatcher),
            vec!["a@example.com".to_string(), "b@example.com".to_string()],
            vec![],
        );
        mailer.mute("a@example.com").await;

        mailer.broadcast_alert("subject", "body").await.expect("dispatched");
    }

    #[tokio::test]
    async fn empty_recipient_list_is_a_no_op() {
        let mut dispatcher = MockMailDispatcher::new();
        dispatcher.expect_send().times(0);

        let mailer = AlertMailer::new(Arc::new(dispatcher), vec![], vec![]);
        mailer.broadcast_alert("subject", "body").await.expect("no-op");
    }

    #[tokio::test]
    async fn unmute_restores_delivery() {
        let mut dispatcher = MockMailDispatcher::new();
        dispatcher
            .expect_send()
            .withf(|recipients, _, _, _| recipients.len() == 1)
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let mailer = AlertMailer::new(
            Arc::new(dispatcher),
            vec![],
            vec!["watch@example.com".to_string()],
        );
        mailer.mute("watch@example.com").await;
        mailer
            .broadcast_anomaly("subject", "body", None)
            .await
            .expect("muted no-op");
        mailer.unmute("watch@example.com").await;
        mailer
            .broadcast_anomaly("subject", "body", None)
            .await
            .expect("dispatched");
    }
}
