//! Discovery Engine (C3) — periodically enumerates tenants and environments,
//! publishing an atomically-swapped snapshot consumed by the collector.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::Mutex;

use crate::client::UpstreamClient;
use crate::config::DiscoveryConfig;
use crate::domain::EnvironmentRef;

/// The current view of tenants/environments visible to the configured
/// credential. Replaced wholesale on every successful discovery cycle.
#[derive(Debug, Clone, Default)]
pub struct DiscoverySnapshot {
    pub root_tenant_id: String,
    pub environments: Vec<EnvironmentRef>,
    pub complete: bool,
}

pub struct DiscoveryEngine {
    client: Arc<UpstreamClient>,
    config: DiscoveryConfig,
    configured_root_tenant_id: Mutex<String>,
    snapshot: ArcSwap<DiscoverySnapshot>,
}

impl DiscoveryEngine {
    pub fn new(client: Arc<UpstreamClient>, config: DiscoveryConfig, configured_root_tenant_id: String) -> Self {
        let initial = if config.auto_discovery {
            DiscoverySnapshot::default()
        } else {
            // Manual environment set is the permanent snapshot; no tenant
            // hierarchy is modeled in this mode.
            DiscoverySnapshot {
                root_tenant_id: configured_root_tenant_id.clone(),
                environments: config
                    .environments
                    .iter()
                    .map(|name| EnvironmentRef {
                        id: name.clone(),
                        name: name.clone(),
                        tenant: crate::domain::TenantRef {
                            id: configured_root_tenant_id.clone(),
                            name: configured_root_tenant_id.clone(),
                        },
                        env_type: "manual".to_string(),
                    })
                    .collect(),
                complete: true,
            }
        };

        Self {
            client,
            config,
            configured_root_tenant_id: Mutex::new(configured_root_tenant_id),
            snapshot: ArcSwap::from_pointee(initial),
        }
    }

    pub fn snapshot(&self) -> Arc<DiscoverySnapshot> {
        self.snapshot.load_full()
    }

    /// Run one discovery cycle. No-op when auto-discovery is disabled (the
    /// manual snapshot built in `new` is permanent).
    pub async fn run_once(&self) {
        if !self.config.auto_discovery {
            return;
        }

        let self_orgs = match self.client.list_self().await {
            Ok(orgs) => orgs,
            Err(e) => {
                tracing::warn!(error = %e, "discovery: listSelf failed, keeping prior snapshot");
                return;
            }
        };

        {
            let mut configured = self.configured_root_tenant_id.lock().await;
            if configured.is_empty() {
                *configured = self_orgs.root.id.clone();
            }
        }

        let mut tenants = vec![self_orgs.root.clone()];
        for member in &self_orgs.members {
            if !tenants.iter().any(|t| t.id == member.id) {
                tenants.push(member.clone());
            }
        }

        let mut environments = Vec::new();
        for tenant in &tenants {
            match self.client.list_environments(&tenant.id).await {
                Ok(envs) => environments.extend(envs),
                Err(e) => {
                    tracing::warn!(tenant = %tenant.id, error = %e, "discovery: listEnvironments failed for tenant, continuing");
                }
            }
        }

        let root_tenant_id = self.configured_root_tenant_id.lock().await.clone();
        self.snapshot.store(Arc::new(DiscoverySnapshot {
            root_tenant_id,
            environments,
            complete: true,
        }));
    }

    /// Run the fixed-delay discovery loop until the process shuts down.
    pub async fn run_loop(&self) {
        if self.config.auto_discovery {
            self.run_once().await;
        }
        loop {
            tokio::time::sleep(std::time::Duration::from_millis(self.config.refresh_interval_ms)).await;
            self.run_once().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthConfig, HttpConfig};

    fn test_client() -> Arc<UpstreamClient> {
        Arc::new(UpstreamClient::new(
            "https://example.com".to_string(),
            AuthConfig::ClientCredentials {
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
            },
            HttpConfig::default(),
        ))
    }

    #[test]
    fn manual_mode_snapshot_is_immediately_complete() {
        let config = DiscoveryConfig {
            auto_discovery: false,
            environments: vec!["prod".to_string()],
            ..DiscoveryConfig::default()
        };
        let engine = DiscoveryEngine::new(test_client(), config, "tenant-1".to_string());
        let snapshot = engine.snapshot();
        assert!(snapshot.complete);
        assert_eq!(snapshot.environments.len(), 1);
        assert_eq!(snapshot.root_tenant_id, "tenant-1");
    }

    #[test]
    fn auto_discovery_mode_starts_incomplete() {
        let config = DiscoveryConfig::default();
        let engine = DiscoveryEngine::new(test_client(), config, String::new());
        assert!(!engine.snapshot().complete);
    }
}
