//! Collection Scheduler (C4) — fixed-delay fan-out over (environment ×
//! region), per-destination stats fetch, gauge publication, and the
//! current-stats handoff to the Monitor Evaluator (C5).

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::stream::{self, StreamExt};

use crate::client::UpstreamClient;
use crate::config::ScrapeConfig;
use crate::discovery::DiscoveryEngine;
use crate::domain::{Destination, QueueStats};

/// Key into the current-stats handoff map: (queue name, environment, region).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatsKey {
    pub queue_name: String,
    pub environment: String,
    pub region: String,
}

#[derive(Debug, Clone)]
pub struct StatsEntry {
    pub stats: QueueStats,
    pub is_dlq: bool,
    pub updated_at: DateTime<Utc>,
}

pub type CurrentStatsMap = DashMap<StatsKey, StatsEntry>;

pub struct CollectionScheduler {
    client: Arc<UpstreamClient>,
    discovery: Arc<DiscoveryEngine>,
    config: ScrapeConfig,
    pub current_queue_stats: Arc<CurrentStatsMap>,
}

impl CollectionScheduler {
    pub fn new(client: Arc<UpstreamClient>, discovery: Arc<DiscoveryEngine>, config: ScrapeConfig) -> Self {
        Self {
            client,
            discovery,
            config,
            current_queue_stats: Arc::new(DashMap::new()),
        }
    }

    /// Run a single collection cycle. Never panics or propagates per-item
    /// errors — each failure is isolated and counted.
    pub async fn run_cycle(&self) {
        let started = Instant::now();
        let snapshot = self.discovery.snapshot();

        if snapshot.environments.is_empty() {
            tracing::debug!("collection cycle skipped: no environments in snapshot");
            crate::metrics::observe_scrape_duration(started.elapsed().as_secs_f64(), "empty");
            return;
        }

        let tuples: Vec<(crate::domain::EnvironmentRef, String)> = snapshot
            .environments
            .iter()
            .flat_map(|env| self.config.regions.iter().map(move |region| (env.clone(), region.clone())))
            .collect();

        let any_success = stream::iter(tuples)
            .map(|(env, region)| self.collect_one_tuple(env, region))
            .buffer_unordered(crate::config::defaults::COLLECTION_CONCURRENCY)
            .fold(false, |acc, ok| async move { acc || ok })
            .await;

        self.sweep_stale_entries();

        let elapsed = started.elapsed().as_secs_f64();
        let outcome = if any_success { "success" } else { "failed" };
        crate::metrics::observe_scrape_duration(elapsed, outcome);
        if any_success {
            crate::metrics::set_last_scrape_timestamp(Utc::now().timestamp() as f64);
        }
    }

    /// Returns `true` if at least one destination in this tuple was
    /// processed without error.
    async fn collect_one_tuple(&self, env: crate::domain::EnvironmentRef, region: String) -> bool {
        let tenant_id = &env.tenant.id;
        let destinations = match self.client.list_destinations(tenant_id, &env.id, &region).await {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(environment = %env.name, region = %region, error = %e, "listDestinations failed for environment");
                crate::metrics::record_scrape_error("environment_failed");
                return false;
            }
        };

        let results: Vec<bool> = stream::iter(destinations)
            .map(|dest| self.collect_one_destination(&env, &region, dest))
            .buffer_unordered(crate::config::defaults::COLLECTION_CONCURRENCY)
            .collect()
            .await;

        results.into_iter().any(|ok| ok)
    }

    async fn collect_one_destination(&self, env: &crate::domain::EnvironmentRef, region: &str, dest: Destination) -> bool {
        let tenant_id = &env.tenant.id;
        match &dest {
            Destination::Queue(common, _) => {
                match self
                    .client
                    .get_queue_stats(tenant_id, &env.id, region, &common.id, self.config.period_seconds)
                    .await
                {
                    Ok(stats) => {
                        crate::metrics::publish_destination_stats(&dest, &env.name, Some(&stats), None);
                        let name = crate::domain::sanitize_name(Some(dest.name()));
                        self.current_queue_stats.insert(
                            StatsKey {
                                queue_name: name.clone(),
                                environment: env.name.clone(),
                                region: region.to_string(),
                            },
                            StatsEntry {
                                stats,
                                is_dlq: crate::domain::is_dlq_heuristic(&name),
                                updated_at: Utc::now(),
                            },
                        );
                        true
                    }
                    Err(crate::error::ApiError::NotFound) => {
                        tracing::debug!(destination = %dest.name(), "queue vanished between enumeration and stats fetch");
                        crate::metrics::record_scrape_error("queue_stats_failed");
                        false
                    }
                    Err(e) => {
                        tracing::warn!(destination = %dest.name(), error = %e, "getQueueStats failed");
                        crate::metrics::record_scrape_error("queue_stats_failed");
                        false
                    }
                }
            }
            Destination::Exchange(common, _) => {
                match self
                    .client
                    .get_exchange_stats(tenant_id, &env.id, region, &common.id, self.config.period_seconds)
                    .await
                {
                    Ok(stats) => {
                        crate::metrics::publish_destination_stats(&dest, &env.name, None, Some(&stats));
                        true
                    }
                    Err(crate::error::ApiError::NotFound) => {
                        tracing::debug!(destination = %dest.name(), "exchange vanished between enumeration and stats fetch");
                        crate::metrics::record_scrape_error("exchange_stats_failed");
                        false
                    }
                    Err(e) => {
                        tracing::warn!(destination = %dest.name(), error = %e, "getExchangeStats failed");
                        crate::metrics::record_scrape_error("exchange_stats_failed");
                        false
                    }
                }
            }
        }
    }

    /// Drop current-stats entries untouched for longer than
    /// `STALE_ENTRY_SCRAPE_INTERVALS` scrape intervals. Not specified
    /// upstream — bounds memory for destinations that disappear permanently
    /// while tolerating brief staleness across cycles, per spec.md §4.4.
    fn sweep_stale_entries(&self) {
        let max_age = chrono::Duration::seconds(
            self.config.interval_seconds as i64 * crate::config::defaults::STALE_ENTRY_SCRAPE_INTERVALS as i64,
        );
        let now = Utc::now();
        self.current_queue_stats.retain(|_, entry| now - entry.updated_at < max_age);
    }

    /// Run the fixed-delay collection loop: next run starts `interval`
    /// after the previous one *finished*, so a slow cycle never overlaps
    /// with itself.
    pub async fn run_loop(&self) {
        loop {
            if self.config.enabled {
                self.run_cycle().await;
            }
            tokio::time::sleep(std::time::Duration::from_secs(self.config.interval_seconds)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_sweep_retains_recent_and_drops_old() {
        let map: CurrentStatsMap = DashMap::new();
        let now = Utc::now();
        map.insert(
            StatsKey {
                queue_name: "fresh".to_string(),
                environment: "Prod".to_string(),
                region: "us-east-1".to_string(),
            },
            StatsEntry {
                stats: QueueStats::default(),
                is_dlq: false,
                updated_at: now,
            },
        );
        map.insert(
            StatsKey {
                queue_name: "stale".to_string(),
                environment: "Prod".to_string(),
                region: "us-east-1".to_string(),
            },
            StatsEntry {
                stats: QueueStats::default(),
                is_dlq: false,
                updated_at: now - chrono::Duration::seconds(10_000),
            },
        );

        let max_age = chrono::Duration::seconds(60 * 3);
        map.retain(|_, entry| now - entry.updated_at < max_age);

        assert_eq!(map.len(), 1);
        assert!(map.contains_key(&StatsKey {
            queue_name: "fresh".to_string(),
            environment: "Prod".to_string(),
            region: "us-east-1".to_string(),
        }));
    }
}
