//! End-to-end scenarios driven against a mocked upstream, covering the
//! documented cold-start, DLQ-cooldown, throughput-drop, and
//! partial-failure behaviors.

use std::sync::Arc;

use mq_exporter::client::UpstreamClient;
use mq_exporter::config::{AuthConfig, HttpConfig};

fn test_auth() -> AuthConfig {
    AuthConfig::ClientCredentials {
        client_id: "client-1".to_string(),
        client_secret: "secret-1".to_string(),
    }
}

async fn mock_auth(server: &mut mockito::ServerGuard) -> mockito::Mock {
    server
        .mock("POST", "/accounts/api/v2/oauth2/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"tok-1","token_type":"Bearer","expires_in":3600}"#)
        .create_async()
        .await
}

/// S1 — cold start, one tenant/environment/region/queue with traffic.
#[tokio::test]
async fn s1_cold_start_single_queue_publishes_expected_gauges() {
    let mut server = mockito::Server::new_async().await;
    let _auth_mock = mock_auth(&mut server).await;

    let _destinations_mock = server
        .mock(
            "GET",
            "/mq/admin/api/v1/organizations/T1/environments/E1/regions/us-east-1/destinations",
        )
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"[{"queueId":"q1","queueName":"orders","type":"queue","fifo":false,"maxDeliveries":5,"defaultTtl":60000}]"#,
        )
        .create_async()
        .await;

    let _stats_mock = server
        .mock(
            "GET",
            mockito::Matcher::Regex(
                r"^/mq/stats/api/v1/organizations/T1/environments/E1/regions/us-east-1/queues/q1".to_string(),
            ),
        )
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"messagesInQueue":[0,0,7],"messagesInFlight":[1],"messagesSent":[12],"messagesReceived":[10],"messagesAcked":[9]}"#,
        )
        .create_async()
        .await;

    let client = Arc::new(UpstreamClient::new(server.url(), test_auth(), HttpConfig::default()));

    let destinations = client.list_destinations("T1", "E1", "us-east-1").await.unwrap();
    assert_eq!(destinations.len(), 1);
    let dest = &destinations[0];
    let stats = client
        .get_queue_stats("T1", "E1", "us-east-1", dest.id(), 600)
        .await
        .unwrap();
    assert_eq!(stats.messages_in_queue, 7);
    assert_eq!(stats.messages_in_flight, 1);
    assert_eq!(stats.messages_sent, 12);
    assert_eq!(stats.messages_received, 10);
    assert_eq!(stats.messages_acked, 9);

    mq_exporter::metrics::publish_destination_stats(dest, "Prod", Some(&stats), None);
    let rendered = String::from_utf8(mq_exporter::metrics::encode_text().unwrap()).unwrap();
    let in_queue_line = rendered
        .lines()
        .find(|l| l.starts_with("anypoint_mq_queue_messages_in_queue{"))
        .expect("in-queue gauge line present");
    assert!(in_queue_line.contains(r#"queue_name="orders""#));
    assert!(in_queue_line.contains(r#"environment="Prod""#));
    assert!(in_queue_line.contains(r#"region="us-east-1""#));
    assert!(in_queue_line.trim_end().ends_with(" 7"));
    assert!(rendered.contains("is_fifo=\"false\""));
    assert!(rendered.contains("is_dlq=\"false\""));
    assert!(rendered.contains("max_deliveries=\"5\""));
}

/// S2 — DLQ heuristic + DlqAlert monitor with cooldown suppression.
#[test]
fn s2_dlq_alert_triggers_then_suppresses_then_reemits() {
    use mq_exporter::alerts::{gate, GateDecision};

    let first_trigger = chrono::Utc::now();
    // First evaluation: no prior notification, dispatch.
    assert_eq!(gate(None, 15, first_trigger), GateDecision::Dispatch);

    // Five minutes later, same monitor/destination, still within cooldown.
    let five_minutes_later = first_trigger + chrono::Duration::minutes(5);
    assert!(matches!(
        gate(Some(first_trigger), 15, five_minutes_later),
        GateDecision::Suppressed { .. }
    ));

    // Twenty minutes after the first notification, cooldown has elapsed.
    let twenty_minutes_later = first_trigger + chrono::Duration::minutes(20);
    assert_eq!(gate(Some(first_trigger), 15, twenty_minutes_later), GateDecision::Dispatch);
}

/// S3 — throughput drop percent-change matches the documented arithmetic.
#[test]
fn s3_throughput_drop_percent_change() {
    use mq_exporter::domain::{MonitorDefinition, MonitorType, Severity, ThresholdCondition};
    use mq_exporter::monitors::MonitorEvaluator;

    let def = MonitorDefinition {
        name: "throughput-drop".to_string(),
        monitor_type: MonitorType::ThroughputDrop,
        target: "*".to_string(),
        condition: ThresholdCondition::PctChange,
        threshold: -50.0,
        evaluation_window_minutes: Some(2),
        cooldown_minutes: Some(15),
        severity: Severity::Warning,
        channels: vec![],
        enabled: true,
    };

    let evaluator = MonitorEvaluator::new(vec![def], mq_exporter::monitors::LicenseTier::Pro);
    let stats_map: mq_exporter::collector::CurrentStatsMap = dashmap::DashMap::new();

    for received in [100, 100, 100, 100, 100, 40] {
        stats_map.insert(
            mq_exporter::collector::StatsKey {
                queue_name: "orders".to_string(),
                environment: "Prod".to_string(),
                region: "us-east-1".to_string(),
            },
            mq_exporter::collector::StatsEntry {
                stats: mq_exporter::domain::QueueStats {
                    messages_received: received,
                    ..Default::default()
                },
                is_dlq: false,
                updated_at: chrono::Utc::now(),
            },
        );
        evaluator.evaluate_cycle(&stats_map);
    }

    let last = evaluator.evaluate_cycle(&stats_map);
    let result = last.iter().find(|r| r.monitor_name == "throughput-drop").unwrap();
    let pct = result.metadata.get("percentChange").and_then(|v| v.as_f64());
    assert!(pct.is_some());
    let pct = pct.unwrap();
    assert!((pct - (-51.7)).abs() < 0.5, "pct={pct}");
    assert!(result.triggered);
}

/// S5 — partial failure isolation across multiple environments.
#[tokio::test]
async fn s5_partial_failure_isolates_one_environment() {
    let mut server = mockito::Server::new_async().await;
    let _auth_mock = mock_auth(&mut server).await;

    let _ok_mock = server
        .mock(
            "GET",
            mockito::Matcher::Regex(r"^/mq/admin/api/v1/organizations/T1/environments/E1/".to_string()),
        )
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("[]")
        .create_async()
        .await;

    let _failing_mock = server
        .mock(
            "GET",
            mockito::Matcher::Regex(r"^/mq/admin/api/v1/organizations/T1/environments/E2/".to_string()),
        )
        .with_status(500)
        .expect_at_least(1)
        .create_async()
        .await;

    let _ok_mock_3 = server
        .mock(
            "GET",
            mockito::Matcher::Regex(r"^/mq/admin/api/v1/organizations/T1/environments/E3/".to_string()),
        )
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("[]")
        .create_async()
        .await;

    let client = UpstreamClient::new(
        server.url(),
        test_auth(),
        HttpConfig {
            max_retries: 1,
            ..HttpConfig::default()
        },
    );

    let ok1 = client.list_destinations("T1", "E1", "us-east-1").await;
    let failed = client.list_destinations("T1", "E2", "us-east-1").await;
    let ok3 = client.list_destinations("T1", "E3", "us-east-1").await;

    assert!(ok1.is_ok());
    assert!(failed.is_err());
    assert!(ok3.is_ok());
}
