//! Notification Dispatcher (C7) — resolves a monitor's configured channel
//! names, attempts delivery to each with bounded parallelism, and isolates
//! per-channel failures so one broken channel never blocks its siblings.

pub mod channels;

use std::collections::HashMap;

use futures::stream::{self, StreamExt};

use crate::domain::{ChannelConfig, MonitorResult};
use channels::NotificationChannel;

pub struct NotificationDispatcher {
    channels: HashMap<String, Box<dyn NotificationChannel>>,
}

impl NotificationDispatcher {
    pub fn from_config(
        configured: &HashMap<String, ChannelConfig>,
        http: reqwest::Client,
        smtp: crate::config::SmtpConfig,
    ) -> Self {
        let mut channels: HashMap<String, Box<dyn NotificationChannel>> = HashMap::new();
        for cfg in configured.values() {
            let channel: Box<dyn NotificationChannel> = match cfg.clone() {
                ChannelConfig::Slack { name, webhook_url, .. } => {
                    Box::new(channels::SlackChannel::new(name, webhook_url, http.clone()))
                }
                ChannelConfig::Teams { name, webhook_url, .. } => {
                    Box::new(channels::TeamsChannel::new(name, webhook_url, http.clone()))
                }
                ChannelConfig::PagerDuty { name, routing_key, .. } => {
                    Box::new(channels::PagerDutyChannel::new(name, routing_key, http.clone()))
                }
                ChannelConfig::Webhook { name, url, headers, .. } => {
                    Box::new(channels::WebhookChannel::new(name, url, headers, http.clone()))
                }
                ChannelConfig::Email {
                    name,
                    recipient,
                    sender,
                    ..
                } => Box::new(channels::EmailChannel::new(name, recipient, sender, smtp.clone())),
            };
            channels.insert(channel.name().to_string(), channel);
        }
        Self { channels }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Deliver `result` to every name in `channel_names`, with bounded
    /// concurrency across channels. Names with no matching configured
    /// channel are logged and skipped — config validation should have
    /// already rejected monitors referencing them.
    pub async fn dispatch(&self, result: &MonitorResult, channel_names: &[String]) {
        stream::iter(channel_names.iter())
            .for_each_concurrent(crate::config::defaults::NOTIFICATION_DISPATCH_CONCURRENCY, |name| async move {
                self.dispatch_one(result, name).await;
            })
            .await;
    }

    async fn dispatch_one(&self, result: &MonitorResult, channel_name: &str) {
        let Some(channel) = self.channels.get(channel_name) else {
            tracing::warn!(channel = channel_name, "notification channel not found, skipping");
            return;
        };

        match channel.send(result).await {
            Ok(()) => {
                crate::metrics::record_notification(&result.monitor_name, channel.name(), channel.channel_type(), true);
            }
            Err(e) => {
                tracing::warn!(
                    channel = channel_name,
                    monitor = %result.monitor_name,
                    error = %e,
                    "notification delivery failed"
                );
                crate::metrics::record_notification(&result.monitor_name, channel.name(), channel.channel_type(), false);
                crate::metrics::record_notification_failure(
                    &result.monitor_name,
                    channel.name(),
                    channel.channel_type(),
                    error_class(&e),
                );
            }
        }
    }
}

fn error_class(e: &crate::error::ChannelError) -> &'static str {
    match e {
        crate::error::ChannelError::NotConfigured { .. } => "not_configured",
        crate::error::ChannelError::Rejected { .. } => "rejected",
        crate::error::ChannelError::Transport { .. } => "transport",
    }
}
