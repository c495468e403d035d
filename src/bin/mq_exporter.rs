//! Anypoint MQ Exporter — polling Prometheus exporter and monitor evaluator
//! for a hierarchical cloud messaging service.
//!
//! ## Environment variables
//!
//! | Variable               | Required | Description                               |
//! |-------------------------|----------|-------------------------------------------|
//! | `EXPORTER_CONFIG`       | No       | Path to the TOML config file               |
//! | `EXPORTER_BASE_URL`     | No       | Overrides `baseUrl`                        |
//! | `EXPORTER_LICENSE_KEY`  | No       | Enables pro-tier monitor features          |
//! | `EXPORTER_BIND_ADDRESS` | No       | Overrides the control-plane bind address   |
//! | `LOG_FORMAT`            | No       | `json` for structured logs, else plain text|

use std::sync::Arc;

use clap::Parser;
use mq_exporter::client::UpstreamClient;
use mq_exporter::collector::CollectionScheduler;
use mq_exporter::discovery::DiscoveryEngine;
use mq_exporter::monitors::{LicenseTier, MonitorEvaluator};
use mq_exporter::notify::NotificationDispatcher;
use mq_exporter::server::{self, AppState};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "mq-exporter", about = "Anypoint MQ Prometheus exporter and monitor evaluator")]
struct CliArgs {
    /// Path to the TOML config file (overrides EXPORTER_CONFIG).
    #[arg(long)]
    config: Option<String>,

    /// Bind address for the control-plane server (overrides config).
    #[arg(long)]
    bind_address: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = CliArgs::parse();
    if let Some(path) = args.config {
        std::env::set_var("EXPORTER_CONFIG", path);
    }

    let mut config = match mq_exporter::config::ExporterConfig::load() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            std::process::exit(1);
        }
    };
    if let Some(bind) = args.bind_address {
        config.bind_address = bind;
    }
    let bind_address = config.bind_address.clone();

    mq_exporter::config::init(config);
    let config = mq_exporter::config::get();

    info!(base_url = %config.base_url, bind_address = %bind_address, "starting anypoint-mq-exporter");

    let client = Arc::new(UpstreamClient::new(
        config.base_url.clone(),
        config.auth.clone(),
        config.http.clone(),
    ));

    let discovery = Arc::new(DiscoveryEngine::new(
        Arc::clone(&client),
        config.discovery.clone(),
        config.organization_id.clone(),
    ));

    let collector = Arc::new(CollectionScheduler::new(
        Arc::clone(&client),
        Arc::clone(&discovery),
        config.scrape.clone(),
    ));

    let tier = LicenseTier::from_key(config.license.key.as_deref());
    let evaluator = Arc::new(MonitorEvaluator::new(config.monitors.definitions.clone(), tier));

    let dispatcher = Arc::new(NotificationDispatcher::from_config(
        &config.configured_channels(),
        reqwest::Client::new(),
        config.smtp.clone(),
    ));

    {
        let discovery = Arc::clone(&discovery);
        tokio::spawn(async move { discovery.run_loop().await });
    }
    {
        let collector = Arc::clone(&collector);
        tokio::spawn(async move { collector.run_loop().await });
    }
    {
        let evaluator = Arc::clone(&evaluator);
        let dispatcher = Arc::clone(&dispatcher);
        let collector = Arc::clone(&collector);
        let definitions = config.monitors.definitions.clone();
        let enabled = config.monitors.enabled;
        let interval_seconds = config.monitors.evaluation_interval_seconds;
        tokio::spawn(async move {
            if !enabled {
                return;
            }
            loop {
                let results = evaluator.evaluate_cycle(&collector.current_queue_stats);
                let now = chrono::Utc::now();

                for result in &results {
                    if let Some(def) = definitions.iter().find(|d| d.name == result.monitor_name) {
                        if def.monitor_type == mq_exporter::domain::MonitorType::QueueHealth {
                            mq_exporter::metrics::publish_health_score(
                                &result.destination.destination_name,
                                &result.destination.environment_name,
                                &result.destination.region,
                                result.current_value,
                            );
                        }
                    }
                }

                let dispatchable = mq_exporter::alerts::filter_dispatchable(&results, &definitions, &evaluator, now);
                for result in dispatchable {
                    if let Some(def) = definitions.iter().find(|d| d.name == result.monitor_name) {
                        dispatcher.dispatch(result, &def.channels).await;
                        evaluator.mark_notified(&result.monitor_name, &result.destination, now);
                    }
                }
                tokio::time::sleep(std::time::Duration::from_secs(interval_seconds)).await;
            }
        });
    }

    let state = Arc::new(AppState {
        client,
        discovery,
        collector,
        evaluator,
        dispatcher,
        tier,
    });
    let app = server::build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!(address = %bind_address, "control plane listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!("anypoint-mq-exporter shut down gracefully");
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,mq_exporter=debug"));

    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    info!("shutdown signal received, draining in-flight requests");
}
