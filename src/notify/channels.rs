//! Per-channel payload builders and transports for the Notification
//! Dispatcher (C7). Each channel is a thin transformation from a
//! [`MonitorResult`] into its wire payload, isolated behind the
//! [`NotificationChannel`] trait so the dispatcher depends only on the
//! common behavior.

use async_trait::async_trait;
use lettre::message::Message;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};

use crate::domain::{MonitorResult, Severity};
use crate::error::ChannelError;

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;
    fn channel_type(&self) -> &'static str;
    async fn send(&self, result: &MonitorResult) -> Result<(), ChannelError>;
}

pub struct SlackChannel {
    pub name: String,
    pub webhook_url: String,
    http: reqwest::Client,
}

impl SlackChannel {
    pub fn new(name: String, webhook_url: String, http: reqwest::Client) -> Self {
        Self { name, webhook_url, http }
    }
}

#[async_trait]
impl NotificationChannel for SlackChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn channel_type(&self) -> &'static str {
        "slack"
    }

    async fn send(&self, result: &MonitorResult) -> Result<(), ChannelError> {
        let title = format!("{} triggered for {}", result.monitor_name, result.destination.destination_name);
        let payload = serde_json::json!({
            "text": title,
            "attachments": [{
                "color": severity_color(result.severity),
                "title": title,
                "text": result.message,
                "fields": [
                    {"title": "Environment", "value": result.destination.environment_name, "short": true},
                    {"title": "Region", "value": result.destination.region, "short": true},
                    {"title": "Current value", "value": result.current_value.to_string(), "short": true},
                    {"title": "Threshold", "value": result.threshold.to_string(), "short": true},
                    {"title": "Triggered At", "value": result.evaluated_at.to_rfc3339(), "short": true},
                ],
            }]
        });
        post_json(&self.http, &self.name, &self.webhook_url, &payload).await
    }
}

pub struct TeamsChannel {
    pub name: String,
    pub webhook_url: String,
    http: reqwest::Client,
}

impl TeamsChannel {
    pub fn new(name: String, webhook_url: String, http: reqwest::Client) -> Self {
        Self { name, webhook_url, http }
    }
}

#[async_trait]
impl NotificationChannel for TeamsChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn channel_type(&self) -> &'static str {
        "teams"
    }

    async fn send(&self, result: &MonitorResult) -> Result<(), ChannelError> {
        let payload = serde_json::json!({
            "@type": "MessageCard",
            "@context": "http://schema.org/extensions",
            "themeColor": severity_color(result.severity),
            "title": format!("{} triggered for {}", result.monitor_name, result.destination.destination_name),
            "text": result.message,
            "sections": [{
                "facts": [
                    {"name": "Environment", "value": result.destination.environment_name},
                    {"name": "Region", "value": result.destination.region},
                    {"name": "Current value", "value": result.current_value.to_string()},
                    {"name": "Threshold", "value": result.threshold.to_string()},
                    {"name": "Triggered At", "value": result.evaluated_at.to_rfc3339()},
                ],
            }],
        });
        post_json(&self.http, &self.name, &self.webhook_url, &payload).await
    }
}

pub struct PagerDutyChannel {
    pub name: String,
    pub routing_key: String,
    http: reqwest::Client,
}

impl PagerDutyChannel {
    pub fn new(name: String, routing_key: String, http: reqwest::Client) -> Self {
        Self { name, routing_key, http }
    }
}

#[async_trait]
impl NotificationChannel for PagerDutyChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn channel_type(&self) -> &'static str {
        "pagerduty"
    }

    async fn send(&self, result: &MonitorResult) -> Result<(), ChannelError> {
        let dedup_key = format!(
            "amq-monitor-{}-{}-{}",
            result.monitor_name, result.destination.destination_name, result.destination.environment_name
        );
        let payload = serde_json::json!({
            "routing_key": self.routing_key,
            "event_action": "trigger",
            "dedup_key": dedup_key,
            "payload": {
                "summary": result.message,
                "source": result.destination.destination_name,
                "severity": pagerduty_severity(result.severity),
                "custom_details": {
                    "monitor": result.monitor_name,
                    "environment": result.destination.environment_name,
                    "region": result.destination.region,
                    "currentValue": result.current_value,
                    "threshold": result.threshold,
                },
            },
        });
        post_json(&self.http, &self.name, "https://events.pagerduty.com/v2/enqueue", &payload).await
    }
}

fn pagerduty_severity(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "info",
        Severity::Warning => "warning",
        Severity::Critical => "critical",
    }
}

pub struct WebhookChannel {
    pub name: String,
    pub url: String,
    pub headers: std::collections::HashMap<String, String>,
    http: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(name: String, url: String, headers: std::collections::HashMap<String, String>, http: reqwest::Client) -> Self {
        Self {
            name,
            url,
            headers,
            http,
        }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn channel_type(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, result: &MonitorResult) -> Result<(), ChannelError> {
        let mut req = self.http.post(&self.url).json(result);
        for (key, value) in &self.headers {
            req = req.header(key, value);
        }
        let resp = req.send().await.map_err(|source| ChannelError::Transport {
            channel: self.name.clone(),
            source,
        })?;
        if !resp.status().is_success() {
            return Err(ChannelError::Rejected {
                channel: self.name.clone(),
                reason: format!("upstream returned {}", resp.status()),
            });
        }
        Ok(())
    }
}

pub struct EmailChannel {
    pub name: String,
    pub recipient: String,
    pub sender: String,
    smtp: crate::config::SmtpConfig,
}

impl EmailChannel {
    pub fn new(name: String, recipient: String, sender: String, smtp: crate::config::SmtpConfig) -> Self {
        Self {
            name,
            recipient,
            sender,
            smtp,
        }
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn channel_type(&self) -> &'static str {
        "email"
    }

    async fn send(&self, result: &MonitorResult) -> Result<(), ChannelError> {
        let subject = format!("[{}] {} on {}", result.severity.as_str(), result.monitor_name, result.destination.destination_name);
        let message = Message::builder()
            .from(self.sender.parse().map_err(|_| ChannelError::Rejected {
                channel: self.name.clone(),
                reason: "invalid sender address".to_string(),
            })?)
            .to(self.recipient.parse().map_err(|_| ChannelError::Rejected {
                channel: self.name.clone(),
                reason: "invalid recipient address".to_string(),
            })?)
            .subject(subject)
            .body(result.message.clone())
            .map_err(|e| ChannelError::Rejected {
                channel: self.name.clone(),
                reason: e.to_string(),
            })?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.smtp.host)
            .map_err(|e| ChannelError::Rejected {
                channel: self.name.clone(),
                reason: e.to_string(),
            })?
            .port(self.smtp.port);
        if !self.smtp.username.is_empty() {
            builder = builder.credentials(Credentials::new(self.smtp.username.clone(), self.smtp.password.clone()));
        }
        let transport = builder.build();

        transport.send(message).await.map_err(|e| ChannelError::Rejected {
            channel: self.name.clone(),
            reason: e.to_string(),
        })?;
        Ok(())
    }
}

fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "#2196f3",
        Severity::Warning => "#ff9800",
        Severity::Critical => "#f44336",
    }
}

async fn post_json(http: &reqwest::Client, channel_name: &str, url: &str, payload: &serde_json::Value) -> Result<(), ChannelError> {
    let resp = http
        .post(url)
        .json(payload)
        .send()
        .await
        .map_err(|source| ChannelError::Transport {
            channel: channel_name.to_string(),
            source,
        })?;
    if !resp.status().is_success() {
        return Err(ChannelError::Rejected {
            channel: channel_name.to_string(),
            reason: format!("upstream returned {}", resp.status()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_colors_are_distinct() {
        assert_ne!(severity_color(Severity::Info), severity_color(Severity::Critical));
    }

    #[test]
    fn pagerduty_severity_maps_directly() {
        assert_eq!(pagerduty_severity(Severity::Critical), "critical");
        assert_eq!(pagerduty_severity(Severity::Info), "info");
    }
}
