//! Metrics Publisher (C8) — idempotent upsert adapter over the `prometheus`
//! registry. First update to a (metric name, label set) registers it;
//! subsequent updates only set the value.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder, GaugeVec,
    HistogramVec, TextEncoder,
};

use crate::domain::{Destination, ExchangeStats, QueueStats};

lazy_static! {
    static ref QUEUE_MESSAGES_IN_QUEUE: GaugeVec = register_gauge_vec!(
        "anypoint_mq_queue_messages_in_queue",
        "Messages currently queued",
        &["queue_name", "environment", "region"]
    )
    .expect("metric registration is infallible for a fixed label set");
    static ref QUEUE_MESSAGES_IN_FLIGHT: GaugeVec = register_gauge_vec!(
        "anypoint_mq_queue_messages_in_flight",
        "Messages currently in flight",
        &["queue_name", "environment", "region"]
    )
    .expect("metric registration is infallible for a fixed label set");
    static ref QUEUE_MESSAGES_SENT: GaugeVec = register_gauge_vec!(
        "anypoint_mq_queue_messages_sent",
        "Messages sent in the last collection window",
        &["queue_name", "environment", "region"]
    )
    .expect("metric registration is infallible for a fixed label set");
    static ref QUEUE_MESSAGES_RECEIVED: GaugeVec = register_gauge_vec!(
        "anypoint_mq_queue_messages_received",
        "Messages received in the last collection window",
        &["queue_name", "environment", "region"]
    )
    .expect("metric registration is infallible for a fixed label set");
    static ref QUEUE_MESSAGES_ACKED: GaugeVec = register_gauge_vec!(
        "anypoint_mq_queue_messages_acked",
        "Messages acknowledged in the last collection window",
        &["queue_name", "environment", "region"]
    )
    .expect("metric registration is infallible for a fixed label set");
    static ref QUEUE_SIZE_BYTES: GaugeVec = register_gauge_vec!(
        "anypoint_mq_queue_size_bytes",
        "Queue size in bytes",
        &["queue_name", "environment", "region"]
    )
    .expect("metric registration is infallible for a fixed label set");
    static ref QUEUE_METADATA: GaugeVec = register_gauge_vec!(
        "anypoint_mq_queue",
        "Queue metadata, value is always 1",
        &["queue_name", "environment", "region", "is_fifo", "is_dlq", "max_deliveries", "ttl"]
    )
    .expect("metric registration is infallible for a fixed label set");
    static ref QUEUE_HEALTH_SCORE: GaugeVec = register_gauge_vec!(
        "anypoint_mq_queue_health_score",
        "Composite queue health score in [0, 1]",
        &["queue_name", "environment", "region"]
    )
    .expect("metric registration is infallible for a fixed label set");
    static ref EXCHANGE_MESSAGES_PUBLISHED: GaugeVec = register_gauge_vec!(
        "anypoint_mq_exchange_messages_published",
        "Messages published in the last collection window",
        &["exchange_name", "environment", "region"]
    )
    .expect("metric registration is infallible for a fixed label set");
    static ref EXCHANGE_MESSAGES_DELIVERED: GaugeVec = register_gauge_vec!(
        "anypoint_mq_exchange_messages_delivered",
        "Messages delivered in the last collection window",
        &["exchange_name", "environment", "region"]
    )
    .expect("metric registration is infallible for a fixed label set");
    static ref SCRAPE_ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "scrape_errors_total",
        "Per-cause scrape error count",
        &["cause"]
    )
    .expect("metric registration is infallible for a fixed label set");
    static ref NOTIFICATIONS_TOTAL: CounterVec = register_counter_vec!(
        "notifications_total",
        "Notification dispatch attempts by outcome",
        &["monitor", "channel", "type", "status"]
    )
    .expect("metric registration is infallible for a fixed label set");
    static ref NOTIFICATIONS_FAILED_TOTAL: CounterVec = register_counter_vec!(
        "notifications_failed_total",
        "Notification dispatch failures by error class",
        &["monitor", "channel", "type", "error"]
    )
    .expect("metric registration is infallible for a fixed label set");
    static ref SCRAPE_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "scrape_duration_seconds",
        "Collection cycle duration in seconds",
        &["outcome"],
        vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]
    )
    .expect("metric registration is infallible for a fixed label set");
    static ref LAST_SCRAPE_TIMESTAMP_SECONDS: GaugeVec =
        register_gauge_vec!("last_scrape_timestamp_seconds", "Unix time of the last completed scrape", &[])
            .expect("metric registration is infallible for a fixed label set");
}

/// Publish the gauges for a single destination's latest stats.
pub fn publish_destination_stats(dest: &Destination, environment: &str, queue: Option<&QueueStats>, exchange: Option<&ExchangeStats>) {
    let name = crate::domain::sanitize_name(Some(dest.name()));
    let region = dest.region();

    match dest {
        Destination::Queue(_, attrs) => {
            if let Some(stats) = queue {
                QUEUE_MESSAGES_IN_QUEUE
                    .with_label_values(&[&name, environment, region])
                    .set(stats.messages_in_queue as f64);
                QUEUE_MESSAGES_IN_FLIGHT
                    .with_label_values(&[&name, environment, region])
                    .set(stats.messages_in_flight as f64);
                QUEUE_MESSAGES_SENT
                    .with_label_values(&[&name, environment, region])
                    .set(stats.messages_sent as f64);
                QUEUE_MESSAGES_RECEIVED
                    .with_label_values(&[&name, environment, region])
                    .set(stats.messages_received as f64);
                QUEUE_MESSAGES_ACKED
                    .with_label_values(&[&name, environment, region])
                    .set(stats.messages_acked as f64);
                if let Some(size) = stats.queue_size_bytes {
                    QUEUE_SIZE_BYTES.with_label_values(&[&name, environment, region]).set(size);
                }
            }
            let is_dlq = crate::domain::is_dlq_heuristic(&name);
            QUEUE_METADATA
                .with_label_values(&[
                    &name,
                    environment,
                    region,
                    &attrs.fifo.to_string(),
                    &is_dlq.to_string(),
                    &attrs.max_deliveries.map(|v| v.to_string()).unwrap_or_default(),
                    &attrs.default_ttl.map(|v| v.to_string()).unwrap_or_default(),
                ])
                .set(1.0);
        }
        Destination::Exchange(..) => {
            if let Some(stats) = exchange {
                EXCHANGE_MESSAGES_PUBLISHED
                    .with_label_values(&[&name, environment, region])
                    .set(stats.messages_published as f64);
                EXCHANGE_MESSAGES_DELIVERED
                    .with_label_values(&[&name, environment, region])
                    .set(stats.messages_delivered as f64);
            }
        }
    }
}

pub fn publish_health_score(queue_name: &str, environment: &str, region: &str, score_0_100: f64) {
    QUEUE_HEALTH_SCORE
        .with_label_values(&[queue_name, environment, region])
        .set((score_0_100 / 100.0).clamp(0.0, 1.0));
}

pub fn record_scrape_error(cause: &str) {
    SCRAPE_ERRORS_TOTAL.with_label_values(&[cause]).inc();
}

pub fn record_notification(monitor: &str, channel: &str, channel_type: &str, success: bool) {
    let status = if success { "success" } else { "fail" };
    NOTIFICATIONS_TOTAL
        .with_label_values(&[monitor, channel, channel_type, status])
        .inc();
}

pub fn record_notification_failure(monitor: &str, channel: &str, channel_type: &str, error_class: &str) {
    NOTIFICATIONS_FAILED_TOTAL
        .with_label_values(&[monitor, channel, channel_type, error_class])
        .inc();
}

pub fn observe_scrape_duration(seconds: f64, outcome: &str) {
    SCRAPE_DURATION_SECONDS.with_label_values(&[outcome]).observe(seconds);
}

/// Set only on a scrape that completed without being a total failure, per
/// the design's "a fully-failed scrape still records duration but does not
/// update the last-scrape-timestamp gauge" rule.
pub fn set_last_scrape_timestamp(unix_seconds: f64) {
    LAST_SCRAPE_TIMESTAMP_SECONDS.with_label_values(&[]).set(unix_seconds);
}

/// Render every registered metric in Prometheus text exposition format.
pub fn encode_text() -> Result<Vec<u8>, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DestinationCommon, QueueAttrs};

    #[test]
    fn publishing_queue_stats_is_idempotent_upsert() {
        let dest = Destination::Queue(
            DestinationCommon {
                id: "q1".to_string(),
                display_name: Some("orders".to_string()),
                environment_id: "env1".to_string(),
                region: "us-east-1".to_string(),
                encrypted: false,
            },
            QueueAttrs {
                fifo: false,
                default_ttl: Some(60000),
                max_deliveries: Some(5),
                dead_letter_destination_id: None,
            },
        );
        let stats = QueueStats {
            messages_in_queue: 7,
            messages_in_flight: 1,
            messages_sent: 12,
            messages_received: 10,
            messages_acked: 9,
            queue_size_bytes: None,
            average_message_size: None,
        };
        publish_destination_stats(&dest, "Prod", Some(&stats), None);
        publish_destination_stats(&dest, "Prod", Some(&stats), None);

        let rendered = String::from_utf8(encode_text().unwrap()).unwrap();
        assert!(rendered.contains("anypoint_mq_queue_messages_in_queue"));
        assert!(rendered.contains("queue_name=\"orders\""));
    }
}
