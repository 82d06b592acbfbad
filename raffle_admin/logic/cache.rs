use log::debug;
use std::future::Future;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

struct Entry<T> {
    value: T,
    loaded_at: Instant,
}

/// Last derived view of the rounds, served until it is `stale_after` old
/// or until a write invalidates it.
pub struct RoundsCache<T> {
    stale_after: Duration,
    entry: RwLock<Option<Entry<T>>>,
}

impl<T: Clone> RoundsCache<T> {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            stale_after,
            entry: RwLock::new(None),
        }
    }

    fn fresh(&self, entry: &Option<Entry<T>>) -> Option<T> {
        entry
            .as_ref()
            .filter(|e| e.loaded_at.elapsed() < self.stale_after)
            .map(|e| e.value.clone())
    }

    /// Cached value when fresh, otherwise runs `loader` and keeps its result.
    /// A failed load leaves the previous entry in place.
    pub async fn get_or_refresh<F, Fut, E>(&self, force: bool, loader: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !force {
            if let Some(value) = self.fresh(&*self.entry.read().await) {
                return Ok(value);
            }
        }

        let mut entry = self.entry.write().await;
        // another request may have reloaded while we waited for the lock
        if !force {
            if let Some(value) = self.fresh(&entry) {
                return Ok(value);
            }
        }
        debug!("reloading rounds view");
        let value = loader().await?;
        *entry = Some(Entry {
            value: value.clone(),
            loaded_at: Instant::now(),
        });
        Ok(value)
    }

    pub async fn invalidate(&self) {
        *self.entry.write().await = None;
    }
}
