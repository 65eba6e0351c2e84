use std::{future::Future, time::Duration};

use duka_common::Secret;
use log::*;
use tokio::{sync::Mutex, time::Instant};

use crate::MpesaApiError;

/// A freshly issued OAuth token and its advertised lifetime.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: Secret<String>,
    pub expires_in: Duration,
}

struct CachedToken {
    token: Secret<String>,
    refresh_at: Instant,
}

/// Caches the Daraja access token.
///
/// The token is treated as expired `safety_margin` before the lifetime M-Pesa advertises, and is refreshed lazily by
/// the first caller that needs it afterwards. The lock is held across the refresh, so callers that arrive while a
/// refresh is in flight wait for it and then share its result instead of requesting tokens of their own.
pub struct TokenCache {
    slot: Mutex<Option<CachedToken>>,
    safety_margin: Duration,
}

impl TokenCache {
    pub fn new(safety_margin: Duration) -> Self {
        Self { slot: Mutex::new(None), safety_margin }
    }

    pub async fn get_or_refresh<F, Fut>(&self, fetch: F) -> Result<Secret<String>, MpesaApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AccessToken, MpesaApiError>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(cached) = slot.as_ref() {
            if Instant::now() < cached.refresh_at {
                trace!("📱️ Using cached access token");
                return Ok(cached.token.clone());
            }
            debug!("📱️ Access token has expired");
        }
        let fresh = fetch().await?;
        let lifetime = fresh.expires_in.saturating_sub(self.safety_margin);
        debug!("📱️ New access token acquired. It will be refreshed in {}s", lifetime.as_secs());
        *slot = Some(CachedToken { token: fresh.token.clone(), refresh_at: Instant::now() + lifetime });
        Ok(fresh.token)
    }

    /// Drops the cached token, e.g. after M-Pesa rejected it with a 401.
    pub async fn invalidate(&self) {
        let mut slot = self.slot.lock().await;
        if slot.take().is_some() {
            debug!("📱️ Cached access token invalidated");
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use futures_util::future::join_all;

    use super::*;

    fn issue(
        counter: Arc<AtomicUsize>,
        lifetime: Duration,
    ) -> impl Future<Output = Result<AccessToken, MpesaApiError>> {
        async move {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(AccessToken { token: Secret::new(format!("token-{n}")), expires_in: lifetime })
        }
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let _ = env_logger::try_init();
        let cache = TokenCache::new(Duration::from_secs(60));
        let counter = Arc::new(AtomicUsize::new(0));
        let calls = (0..10).map(|_| {
            let counter = counter.clone();
            let cache = &cache;
            async move { cache.get_or_refresh(|| issue(counter, Duration::from_secs(3600))).await }
        });
        let tokens = join_all(calls).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(tokens.iter().all(|t| t.as_ref().unwrap().reveal() == "token-1"));
    }

    #[tokio::test]
    async fn token_is_refreshed_before_advertised_expiry() {
        let cache = TokenCache::new(Duration::from_secs(60));
        let counter = Arc::new(AtomicUsize::new(0));
        // A 60s token with a 60s safety margin is stale immediately
        let t1 = cache.get_or_refresh(|| issue(counter.clone(), Duration::from_secs(60))).await.unwrap();
        let t2 = cache.get_or_refresh(|| issue(counter.clone(), Duration::from_secs(3600))).await.unwrap();
        let t3 = cache.get_or_refresh(|| issue(counter.clone(), Duration::from_secs(3600))).await.unwrap();
        assert_eq!(t1.reveal(), "token-1");
        assert_eq!(t2.reveal(), "token-2");
        assert_eq!(t3.reveal(), "token-2");
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_refresh_is_not_cached() {
        let cache = TokenCache::new(Duration::from_secs(60));
        let err = cache
            .get_or_refresh(|| async { Err::<AccessToken, _>(MpesaApiError::TokenError("401".into())) })
            .await;
        assert!(err.is_err());
        let counter = Arc::new(AtomicUsize::new(0));
        let token = cache.get_or_refresh(|| issue(counter.clone(), Duration::from_secs(3600))).await.unwrap();
        assert_eq!(token.reveal(), "token-1");
        cache.invalidate().await;
        let token = cache.get_or_refresh(|| issue(counter.clone(), Duration::from_secs(3600))).await.unwrap();
        assert_eq!(token.reveal(), "token-2");
    }
}
