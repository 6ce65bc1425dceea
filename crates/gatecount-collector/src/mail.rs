use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatecount_domain::{DomainResult, MailDispatcher};
use tracing::{debug, info};

/// Dispatcher that records outbound mail in the log instead of an SMTP
/// relay. Stands in wherever a real transport is not configured.
pub struct LogMailDispatcher;

#[async_trait]
impl MailDispatcher for LogMailDispatcher {
    async fn send(
        &self,
        recipients: &[String],
        subject: &str,
        body: &str,
        delay_until: Option<DateTime<Utc>>,
    ) -> DomainResult<()> {
        info!(
            recipients = ?recipients,
            subject,
            delay_until = ?delay_until,
            "outbound mail"
        );
        debug!(body, "outbound mail body");
        Ok(())
    }
}
