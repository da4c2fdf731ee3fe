//! Time-bounded cache cell for repository listings.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

/// A single cached value with a time-to-live.
///
/// The slot is replaced atomically on `set`; readers either see a whole
/// fresh value or nothing. Staleness is bounded by the TTL, so no
/// fine-grained locking is needed.
pub struct TtlCell<T> {
    ttl: Duration,
    slot: RwLock<Option<(Arc<T>, Instant)>>,
}

impl<T> TtlCell<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: RwLock::new(None),
        }
    }

    /// Return the cached value if present and not expired.
    pub async fn get(&self) -> Option<Arc<T>> {
        let slot = self.slot.read().await;
        match slot.as_ref() {
            Some((value, expires_at)) if Instant::now() < *expires_at => Some(Arc::clone(value)),
            _ => None,
        }
    }

    /// Replace the cached value and reset its expiry.
    pub async fn set(&self, value: T) -> Arc<T> {
        let value = Arc::new(value);
        let mut slot = self.slot.write().await;
        *slot = Some((Arc::clone(&value), Instant::now() + self.ttl));
        value
    }

    /// Drop the cached value so the next read goes to the repository.
    pub async fn invalidate(&self) {
        let mut slot = self.slot.write().await;
        *slot = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_cell_misses() {
        let cell: TtlCell<Vec<u32>> = TtlCell::new(Duration::from_secs(60));
        assert!(cell.get().await.is_none());
    }

    #[tokio::test]
    async fn set_then_get() {
        let cell = TtlCell::new(Duration::from_secs(60));
        cell.set(vec![1, 2, 3]).await;
        assert_eq!(*cell.get().await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn invalidate_clears_the_slot() {
        let cell = TtlCell::new(Duration::from_secs(60));
        cell.set(vec![1]).await;
        cell.invalidate().await;
        assert!(cell.get().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn entry_expires_after_ttl() {
        let cell = TtlCell::new(Duration::from_secs(10));
        cell.set(vec![7]).await;

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(cell.get().await.is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cell.get().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn set_resets_expiry() {
        let cell = TtlCell::new(Duration::from_secs(10));
        cell.set(vec![1]).await;
        tokio::time::advance(Duration::from_secs(8)).await;
        cell.set(vec![2]).await;
        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(*cell.get().await.unwrap(), vec![2]);
    }
}
