// src/notify.rs - Fire-and-forget notification sinks (SMS/email)
//
// Delivery failures are logged and never reach the business operation that
// requested the send.

use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send_sms(&self, phone: &str, message: &str) -> anyhow::Result<()>;
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}

/// Default sink: logs what a real SMS/email gateway would deliver.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send_sms(&self, phone: &str, message: &str) -> anyhow::Result<()> {
        log::info!("SMS to {}: {}", phone, message);
        Ok(())
    }

    async fn send_email(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        log::info!("Email to {} [{}]: {}", to, subject, body);
        Ok(())
    }
}

/// Spawn an SMS send without awaiting it.
pub fn send_sms_background(sink: Arc<dyn NotificationSink>, phone: String, message: String) {
    tokio::spawn(async move {
        if let Err(e) = sink.send_sms(&phone, &message).await {
            log::warn!("SMS delivery to {} failed: {}", phone, e);
        }
    });
}

/// Spawn an email send without awaiting it.
pub fn send_email_background(
    sink: Arc<dyn NotificationSink>,
    to: String,
    subject: String,
    body: String,
) {
    tokio::spawn(async move {
        if let Err(e) = sink.send_email(&to, &subject, &body).await {
            log::warn!("Email delivery to {} failed: {}", to, e);
        }
    });
}
