//! Upstream API Client (C2) — typed calls to auth, tenant, environment,
//! destination, and statistics endpoints, with retry/backoff and timeouts.

pub mod decode;

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;

use crate::auth::{Credential, TokenCache};
use crate::config::{AuthConfig, HttpConfig};
use crate::domain::{
    Destination, DestinationCommon, EnvironmentRef, ExchangeAttrs, ExchangeStats, QueueAttrs,
    QueueStats, TenantRef,
};
use crate::error::{ApiError, AuthError};

/// Root tenant plus any sibling/child tenants visible to the credential.
pub struct SelfOrganizations {
    pub root: TenantRef,
    pub members: Vec<TenantRef>,
}

pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: String,
    auth: AuthConfig,
    http_config: HttpConfig,
    pub token_cache: TokenCache,
    last_auth_success_unix: AtomicI64,
}

impl UpstreamClient {
    pub fn new(base_url: String, auth: AuthConfig, http_config: HttpConfig) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(http_config.connect_timeout_seconds))
            .timeout(Duration::from_secs(http_config.read_timeout_seconds))
            .build()
            .expect("failed to build upstream HTTP client");

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
            http_config,
            token_cache: TokenCache::new(),
            last_auth_success_unix: AtomicI64::new(0),
        }
    }

    /// Seconds since the last successful authentication, or `None` if one
    /// has never succeeded. Backs `/actuator/health`'s UP/DOWN decision.
    pub fn seconds_since_last_auth_success(&self) -> Option<i64> {
        let last = self.last_auth_success_unix.load(Ordering::Relaxed);
        if last == 0 {
            None
        } else {
            Some((Utc::now().timestamp() - last).max(0))
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Bounded exponential backoff: retry on `ApiError::Transient`, never on
    /// `ApiError::Auth`/`NotFound`/`Decode`.
    async fn with_retry<T, F, Fut>(&self, op: F) -> Result<T, ApiError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, ApiError>>,
    {
        let max_attempts = self.http_config.max_retries.max(1);
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(ApiError::Transient(msg)) if attempt + 1 < max_attempts => {
                    let delay_secs = crate::config::defaults::HTTP_RETRY_BASE_DELAY_SECONDS
                        * 2u64.saturating_pow(attempt);
                    tracing::debug!(attempt, delay_secs, error = %msg, "retrying transient upstream error");
                    tokio::time::sleep(Duration::from_secs(delay_secs)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Exchange configured credentials for a fresh bearer token. Never
    /// retried at this layer for 4xx — callers retry transient failures.
    pub async fn authenticate(&self) -> Result<Credential, AuthError> {
        self.with_retry(|| async { self.authenticate_once().await.map_err(ApiError::from) })
            .await
            .map_err(api_to_auth)
    }

    async fn authenticate_once(&self) -> Result<Credential, AuthError> {
        let resp = match &self.auth {
            AuthConfig::ClientCredentials {
                client_id,
                client_secret,
            } => {
                self.http
                    .post(self.url("/accounts/api/v2/oauth2/token"))
                    .form(&[
                        ("client_id", client_id.as_str()),
                        ("client_secret", client_secret.as_str()),
                        ("grant_type", "client_credentials"),
                    ])
                    .send()
                    .await
            }
            AuthConfig::Login { username, password } => {
                self.http
                    .post(self.url("/accounts/login"))
                    .json(&serde_json::json!({ "username": username, "password": password }))
                    .send()
                    .await
            }
        };

        let resp = resp.map_err(reqwest_to_auth)?;
        let status = resp.status();
        if status.is_client_error() && status.as_u16() != 429 {
            return Err(AuthError::Failed(format!("upstream returned {status}")));
        }
        if !status.is_success() {
            return Err(AuthError::Transient(format!("upstream returned {status}")));
        }

        let body: Value = resp.json().await.map_err(reqwest_to_auth)?;
        let bearer = body
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| AuthError::Failed("response missing access_token".to_string()))?
            .to_string();
        let token_type = body
            .get("token_type")
            .and_then(Value::as_str)
            .unwrap_or("Bearer")
            .to_string();
        let ttl_seconds = body.get("expires_in").and_then(Value::as_i64).unwrap_or(3600);

        Ok(Credential {
            bearer,
            token_type,
            issued_at: Utc::now(),
            ttl_seconds,
        })
    }

    async fn bearer(&self) -> Result<Credential, ApiError> {
        let cred = self
            .token_cache
            .get(|| async { self.authenticate().await })
            .await
            .map_err(ApiError::from)?;
        self.last_auth_success_unix.store(Utc::now().timestamp(), Ordering::Relaxed);
        Ok(cred)
    }

    pub async fn list_self(&self) -> Result<SelfOrganizations, ApiError> {
        self.with_retry(|| async {
            let cred = self.bearer().await?;
            let resp = self
                .http
                .get(self.url("/accounts/api/me"))
                .header("Authorization", cred.authorization_header())
                .send()
                .await?;
            status_to_result(&resp)?;
            let body: Value = resp.json().await?;
            let org = body
                .get("user")
                .and_then(|u| u.get("organization"))
                .ok_or_else(|| ApiError::Decode("missing user.organization".to_string()))?;
            let root = TenantRef {
                id: org.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
                name: org
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            };
            let mut members: Vec<TenantRef> = body
                .get("user")
                .and_then(|u| u.get("memberOfOrganizations"))
                .and_then(Value::as_array)
                .map(|arr| {
                    arr.iter()
                        .map(|m| TenantRef {
                            id: m.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
                            name: m
                                .get("name")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string(),
                        })
                        .collect()
                })
                .unwrap_or_default();
            // Deduplicate by identifier, root always wins.
            members.retain(|m| m.id != root.id);
            let mut seen = std::collections::HashSet::new();
            members.retain(|m| seen.insert(m.id.clone()));
            Ok(SelfOrganizations { root, members })
        })
        .await
    }

    pub async fn list_environments(&self, tenant_id: &str) -> Result<Vec<EnvironmentRef>, ApiError> {
        self.with_retry(|| async {
            let cred = self.bearer().await?;
            let resp = self
                .http
                .get(self.url(&format!("/accounts/api/organizations/{tenant_id}/environments")))
                .header("Authorization", cred.authorization_header())
                .send()
                .await?;
            status_to_result(&resp)?;
            let body: Value = resp.json().await?;
            let data = body.get("data").and_then(Value::as_array).cloned().unwrap_or_default();
            let tenant = TenantRef {
                id: tenant_id.to_string(),
                name: tenant_id.to_string(),
            };
            Ok(data
                .iter()
                .map(|e| EnvironmentRef {
                    id: e.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
                    name: e.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                    tenant: tenant.clone(),
                    env_type: e.get("type").and_then(Value::as_str).unwrap_or_default().to_string(),
                })
                .collect())
        })
        .await
    }

    pub async fn list_destinations(
        &self,
        tenant_id: &str,
        env_id: &str,
        region: &str,
    ) -> Result<Vec<Destination>, ApiError> {
        self.with_retry(|| async {
            let cred = self.bearer().await?;
            let resp = self
                .http
                .get(self.url(&format!(
                    "/mq/admin/api/v1/organizations/{tenant_id}/environments/{env_id}/regions/{region}/destinations"
                )))
                .header("Authorization", cred.authorization_header())
                .send()
                .await?;
            status_to_result(&resp)?;
            let body: Value = resp.json().await?;
            let items = body.as_array().cloned().unwrap_or_default();
            Ok(items
                .iter()
                .filter_map(|item| parse_destination(item, env_id, region))
                .collect())
        })
        .await
    }

    pub async fn get_queue_stats(
        &self,
        tenant_id: &str,
        env_id: &str,
        region: &str,
        destination_id: &str,
        period_seconds: u64,
    ) -> Result<QueueStats, ApiError> {
        let (start, end) = stats_window(period_seconds);
        self.with_retry(|| async {
            let cred = self.bearer().await?;
            let resp = self
                .http
                .get(self.url(&format!(
                    "/mq/stats/api/v1/organizations/{tenant_id}/environments/{env_id}/regions/{region}/queues/{destination_id}"
                )))
                .query(&[("startDate", start.as_str()), ("endDate", end.as_str()), ("period", &period_seconds.to_string())])
                .header("Authorization", cred.authorization_header())
                .send()
                .await?;
            status_to_result(&resp)?;
            let body: Value = resp.json().await?;
            Ok(parse_queue_stats(&body))
        })
        .await
    }

    pub async fn get_exchange_stats(
        &self,
        tenant_id: &str,
        env_id: &str,
        region: &str,
        destination_id: &str,
        period_seconds: u64,
    ) -> Result<ExchangeStats, ApiError> {
        let (start, end) = stats_window(period_seconds);
        self.with_retry(|| async {
            let cred = self.bearer().await?;
            let resp = self
                .http
                .get(self.url(&format!(
                    "/mq/stats/api/v1/organizations/{tenant_id}/environments/{env_id}/regions/{region}/exchanges/{destination_id}"
                )))
                .query(&[("startDate", start.as_str()), ("endDate", end.as_str()), ("period", &period_seconds.to_string())])
                .header("Authorization", cred.authorization_header())
                .send()
                .await?;
            status_to_result(&resp)?;
            let body: Value = resp.json().await?;
            Ok(parse_exchange_stats(&body))
        })
        .await
    }
}

/// `endTime = now`, `startTime = endTime - periodSeconds`, both millisecond
/// precision UTC ISO-8601 ending in literal `Z`.
fn stats_window(period_seconds: u64) -> (String, String) {
    let end = Utc::now();
    let start = end - chrono::Duration::seconds(period_seconds as i64);
    let fmt = |t: chrono::DateTime<Utc>| t.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
    (fmt(start), fmt(end))
}

fn parse_destination(item: &Value, env_id: &str, region: &str) -> Option<Destination> {
    let kind = item.get("type").and_then(Value::as_str)?;
    let (id_field, name_field) = match kind {
        "queue" => ("queueId", "queueName"),
        "exchange" => ("exchangeId", "exchangeName"),
        _ => return None,
    };
    let id = item.get(id_field).and_then(Value::as_str)?.to_string();
    let display_name = item.get(name_field).and_then(Value::as_str).map(str::to_string);
    let common = DestinationCommon {
        id,
        display_name,
        environment_id: env_id.to_string(),
        region: region.to_string(),
        encrypted: item.get("encrypted").and_then(Value::as_bool).unwrap_or(false),
    };

    match kind {
        "queue" => Some(Destination::Queue(
            common,
            QueueAttrs {
                fifo: item.get("fifo").and_then(Value::as_bool).unwrap_or(false),
                default_ttl: item.get("defaultTtl").and_then(Value::as_i64),
                max_deliveries: item.get("maxDeliveries").and_then(Value::as_i64),
                dead_letter_destination_id: item
                    .get("defaultDeadLetterQueueId")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },
        )),
        "exchange" => Some(Destination::Exchange(common, ExchangeAttrs {})),
        _ => None,
    }
}

fn parse_queue_stats(body: &Value) -> QueueStats {
    QueueStats {
        messages_in_queue: decode::decode_counter(body.get("messagesInQueue")),
        messages_in_flight: decode::decode_counter(body.get("messagesInFlight")),
        messages_sent: decode::decode_counter(body.get("messagesSent")),
        messages_received: decode::decode_counter(body.get("messagesReceived")),
        messages_acked: decode::decode_counter(body.get("messagesAcked")),
        queue_size_bytes: decode::decode_optional_f64(body.get("queueSize")),
        average_message_size: decode::decode_optional_f64(body.get("averageMessageSize")),
    }
}

fn parse_exchange_stats(body: &Value) -> ExchangeStats {
    ExchangeStats {
        messages_published: decode::decode_counter(body.get("messagesPublished")),
        messages_delivered: decode::decode_counter(body.get("messagesDelivered")),
    }
}

fn status_to_result(resp: &reqwest::Response) -> Result<(), ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    if status.as_u16() == 404 {
        return Err(ApiError::NotFound);
    }
    if status.is_server_error() || status.as_u16() == 429 {
        return Err(ApiError::Transient(format!("upstream returned {status}")));
    }
    Err(ApiError::Decode(format!("upstream returned {status}")))
}

fn reqwest_to_auth(e: reqwest::Error) -> AuthError {
    AuthError::Transient(e.to_string())
}

fn api_to_auth(e: ApiError) -> AuthError {
    match e {
        ApiError::Auth(inner) => inner,
        other => AuthError::Transient(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_window_ends_with_literal_z_and_ms_precision() {
        let (start, end) = stats_window(600);
        assert!(start.ends_with('Z'));
        assert!(end.ends_with('Z'));
        assert!(start.contains('.'));
    }

    #[test]
    fn parse_destination_filters_by_kind() {
        let queue = serde_json::json!({
            "queueId": "q1", "queueName": "orders", "type": "queue",
            "fifo": false, "maxDeliveries": 5, "defaultTtl": 60000
        });
        let dest = parse_destination(&queue, "env1", "us-east-1").unwrap();
        assert!(dest.is_queue());
        assert_eq!(dest.name(), "orders");

        let exchange = serde_json::json!({"exchangeId": "x1", "exchangeName": "fanout", "type": "exchange"});
        let dest = parse_destination(&exchange, "env1", "us-east-1").unwrap();
        assert!(!dest.is_queue());

        let unknown = serde_json::json!({"type": "topic"});
        assert!(parse_destination(&unknown, "env1", "us-east-1").is_none());
    }

    #[test]
    fn destination_falls_back_to_id_when_name_missing() {
        let queue = serde_json::json!({"queueId": "q1", "type": "queue"});
        let dest = parse_destination(&queue, "env1", "us-east-1").unwrap();
        assert_eq!(dest.name(), "q1");
    }

    #[test]
    fn parse_stats_array_and_scalar() {
        let first = serde_json::json!({"messagesPublished": [5, 9], "messagesDelivered": 9});
        let stats = parse_exchange_stats(&first);
        assert_eq!(stats.messages_published, 9);
        assert_eq!(stats.messages_delivered, 9);

        let second = serde_json::json!({"messagesPublished": [], "messagesDelivered": null});
        let stats = parse_exchange_stats(&second);
        assert_eq!(stats.messages_published, 0);
        assert_eq!(stats.messages_delivered, 0);
    }
}
