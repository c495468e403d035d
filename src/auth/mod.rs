//! Token Cache (C1) — single-slot atomic credential cache with single-flight
//! refresh.

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::config::defaults::TOKEN_SAFETY_MARGIN_SECS;
use crate::error::AuthError;

/// An opaque bearer credential obtained from the upstream authentication
/// endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub bearer: String,
    pub token_type: String,
    pub issued_at: DateTime<Utc>,
    pub ttl_seconds: i64,
}

impl Credential {
    /// Invalid when the bearer is empty or when `now + safety_margin` has
    /// reached or passed `issued_at + ttl`.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        if self.bearer.is_empty() {
            return false;
        }
        let expires_at = self.issued_at + chrono::Duration::seconds(self.ttl_seconds);
        now + chrono::Duration::seconds(TOKEN_SAFETY_MARGIN_SECS) < expires_at
    }

    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.bearer)
    }
}

/// Single-slot credential cache.
///
/// Holding the internal mutex across the authentication call is what gives
/// single-flight semantics: concurrent callers queue on the lock, the first
/// one through performs the refresh, and the rest observe the freshly
/// stored credential without issuing a second upstream auth call.
pub struct TokenCache {
    slot: Mutex<Option<Credential>>,
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCache {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Obtain a valid credential, refreshing via `authenticate` on a miss.
    /// On a non-retryable `AuthError::Failed`, the slot is cleared before
    /// the error is surfaced to the caller.
    pub async fn get<F, Fut>(&self, authenticate: F) -> Result<Credential, AuthError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Credential, AuthError>>,
    {
        let mut guard = self.slot.lock().await;
        if let Some(cred) = guard.as_ref() {
            if cred.is_valid(Utc::now()) {
                return Ok(cred.clone());
            }
        }

        match authenticate().await {
            Ok(cred) => {
                *guard = Some(cred.clone());
                Ok(cred)
            }
            Err(err @ AuthError::Failed(_)) => {
                *guard = None;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn clear(&self) {
        *self.slot.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fresh_credential() -> Credential {
        Credential {
            bearer: "token-1".to_string(),
            token_type: "Bearer".to_string(),
            issued_at: Utc::now(),
            ttl_seconds: 3600,
        }
    }

    #[test]
    fn empty_bearer_is_invalid() {
        let mut cred = fresh_credential();
        cred.bearer.clear();
        assert!(!cred.is_valid(Utc::now()));
    }

    #[test]
    fn expiring_within_safety_margin_is_invalid() {
        let cred = Credential {
            issued_at: Utc::now() - chrono::Duration::seconds(3600 - 60),
            ..fresh_credential()
        };
        assert!(!cred.is_valid(Utc::now()));
    }

    #[tokio::test]
    async fn concurrent_misses_trigger_exactly_one_refresh() {
        let cache = Arc::new(TokenCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get(|| async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        Ok(Credential {
                            bearer: "token-1".to_string(),
                            token_type: "Bearer".to_string(),
                            issued_at: Utc::now(),
                            ttl_seconds: 3600,
                        })
                    })
                    .await
            }));
        }

        for h in handles {
            let cred = h.await.unwrap().unwrap();
            assert_eq!(cred.bearer, "token-1");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn auth_failure_clears_slot() {
        let cache = TokenCache::new();
        let result = cache
            .get(|| async { Err(AuthError::Failed("bad credentials".to_string())) })
            .await;
        assert!(result.is_err());

        // A subsequent successful call should refresh rather than return a
        // stale invalid slot.
        let cred = cache.get(|| async { Ok(fresh_credential()) }).await.unwrap();
        assert_eq!(cred.bearer, "token-1");
    }
}
