use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use uuid::Uuid;

/// Proof of lease ownership. Release only succeeds with the matching token,
/// so a worker whose lease expired cannot evict the next holder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseToken(Uuid);

/// A time-bounded exclusive claim on a resource key. At most one holder per
/// key at any instant; expiry guarantees forward progress if a holder dies
/// inside its critical section.
#[async_trait]
pub trait LeaseManager: Send + Sync {
    /// Returns a token when the key was free (or its previous lease expired),
    /// `None` while another worker holds it.
    async fn acquire(&self, key: &str, ttl: Duration) -> Option<LeaseToken>;

    async fn release(&self, key: &str, token: &LeaseToken);
}

/// Process-local lease table. Stands in for the coordination store
/// (SET NX EX style) when all executors share one process.
#[derive(Default)]
pub struct MemoryLeaseManager {
    leases: Mutex<HashMap<String, (LeaseToken, Instant)>>,
}

impl MemoryLeaseManager {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LeaseManager for MemoryLeaseManager {
    async fn acquire(&self, key: &str, ttl: Duration) -> Option<LeaseToken> {
        let mut leases = self.leases.lock().expect("lease table poisoned");
        let now = Instant::now();
        match leases.get(key) {
            Some((_, expires_at)) if *expires_at > now => None,
            _ => {
                let token = LeaseToken(Uuid::new_v4());
                leases.insert(key.to_string(), (token.clone(), now + ttl));
                Some(token)
            }
        }
    }

    async fn release(&self, key: &str, token: &LeaseToken) {
        let mut leases = self.leases.lock().expect("lease table poisoned");
        if let Some((held, _)) = leases.get(key) {
            if held == token {
                leases.remove(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_fails_while_held() {
        let leases = MemoryLeaseManager::new();
        let ttl = Duration::from_secs(5);
        let token = leases.acquire("signal:a", ttl).await.unwrap();
        assert!(leases.acquire("signal:a", ttl).await.is_none());

        leases.release("signal:a", &token).await;
        assert!(leases.acquire("signal:a", ttl).await.is_some());
    }

    #[tokio::test]
    async fn expired_lease_is_reclaimable() {
        let leases = MemoryLeaseManager::new();
        let _token = leases
            .acquire("signal:b", Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(
            leases
                .acquire("signal:b", Duration::from_secs(5))
                .await
                .is_some()
        );
    }

    #[tokio::test]
    async fn stale_token_cannot_release_new_lease() {
        let leases = MemoryLeaseManager::new();
        let stale = leases
            .acquire("signal:c", Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;

        let fresh = leases
            .acquire("signal:c", Duration::from_secs(5))
            .await
            .unwrap();
        leases.release("signal:c", &stale).await;
        // The fresh lease must still be in force.
        assert!(
            leases
                .acquire("signal:c", Duration::from_secs(5))
                .await
                .is_none()
        );
        leases.release("signal:c", &fresh).await;
    }
}
