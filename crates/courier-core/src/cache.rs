//! Read-through cache for entity lists
//!
//! Each entity kind gets its own `ListCache`, keyed by the scope a list was
//! queried with. Writers call `invalidate` after every change to that kind;
//! entries also expire after a fixed time so changes made by another
//! process show up.

use courier_common::config::CacheConfig;
use courier_common::types::UserId;
use courier_common::Result;
use courier_storage::models::{Mailing, Message, Recipient};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// Which rows a cached list holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheScope {
    All,
    Owner(UserId),
}

impl CacheScope {
    /// Scope for a viewer who either sees everything or only their own rows
    pub fn for_viewer(user_id: UserId, sees_all: bool) -> Self {
        if sees_all {
            CacheScope::All
        } else {
            CacheScope::Owner(user_id)
        }
    }

    /// Owner filter to pass to a repository `list` call
    pub fn owner_filter(self) -> Option<UserId> {
        match self {
            CacheScope::All => None,
            CacheScope::Owner(id) => Some(id),
        }
    }
}

#[derive(Debug)]
struct Cached<T> {
    list: Arc<Vec<T>>,
    stored_at: Instant,
}

#[derive(Debug)]
struct Entries<T> {
    generation: u64,
    lists: HashMap<CacheScope, Cached<T>>,
}

/// List cache for one entity kind
#[derive(Debug)]
pub struct ListCache<T> {
    name: &'static str,
    enabled: bool,
    ttl: Duration,
    entries: RwLock<Entries<T>>,
}

impl<T: Clone + Send + Sync> ListCache<T> {
    pub fn new(name: &'static str, enabled: bool, ttl: Duration) -> Self {
        Self {
            name,
            enabled,
            ttl,
            entries: RwLock::new(Entries {
                generation: 0,
                lists: HashMap::new(),
            }),
        }
    }

    /// Return the cached list for `scope`, calling `load` on a miss or
    /// when the stored list is older than the TTL.
    ///
    /// A list loaded while an invalidation happened is returned but not
    /// stored.
    pub async fn get_or_load<F, Fut>(&self, scope: CacheScope, load: F) -> Result<Vec<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>>>,
    {
        if !self.enabled {
            return load().await;
        }

        let generation = {
            let entries = self.entries.read().await;
            match entries.lists.get(&scope) {
                Some(cached) if cached.stored_at.elapsed() < self.ttl => {
                    debug!(cache = self.name, ?scope, "List cache hit");
                    return Ok(cached.list.as_ref().clone());
                }
                Some(_) => debug!(cache = self.name, ?scope, "List cache entry expired"),
                None => {}
            }
            entries.generation
        };

        let list = load().await?;

        let mut entries = self.entries.write().await;
        if entries.generation == generation {
            entries.lists.insert(
                scope,
                Cached {
                    list: Arc::new(list.clone()),
                    stored_at: Instant::now(),
                },
            );
        }
        Ok(list)
    }

    /// Drop every cached list of this kind
    pub async fn invalidate(&self) {
        let mut entries = self.entries.write().await;
        entries.generation += 1;
        entries.lists.clear();
        debug!(cache = self.name, "List cache invalidated");
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.lists.len()
    }
}

/// Caches for every listed entity kind
#[derive(Debug)]
pub struct EntityCaches {
    pub recipients: ListCache<Recipient>,
    pub messages: ListCache<Message>,
    pub mailings: ListCache<Mailing>,
}

impl EntityCaches {
    pub fn new(enabled: bool, ttl: Duration) -> Self {
        Self {
            recipients: ListCache::new("recipients", enabled, ttl),
            messages: ListCache::new("messages", enabled, ttl),
            mailings: ListCache::new("mailings", enabled, ttl),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.enabled, Duration::from_secs(config.ttl_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TTL: Duration = Duration::from_secs(300);

    async fn load(calls: &AtomicUsize, value: &str) -> Result<Vec<String>> {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![value.to_string()])
    }

    #[tokio::test]
    async fn test_cache_hit_and_invalidate() {
        let cache = ListCache::new("test", true, TTL);
        let calls = AtomicUsize::new(0);

        let first = cache
            .get_or_load(CacheScope::All, || load(&calls, "a"))
            .await
            .unwrap();
        let second = cache
            .get_or_load(CacheScope::All, || load(&calls, "b"))
            .await
            .unwrap();
        assert_eq!(first, vec!["a"]);
        assert_eq!(second, vec!["a"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.invalidate().await;
        let third = cache
            .get_or_load(CacheScope::All, || load(&calls, "c"))
            .await
            .unwrap();
        assert_eq!(third, vec!["c"]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_scopes_are_separate() {
        let cache = ListCache::new("test", true, TTL);
        let calls = AtomicUsize::new(0);
        let owner = uuid::Uuid::now_v7();

        cache
            .get_or_load(CacheScope::All, || load(&calls, "all"))
            .await
            .unwrap();
        let own = cache
            .get_or_load(CacheScope::Owner(owner), || load(&calls, "own"))
            .await
            .unwrap();
        assert_eq!(own, vec!["own"]);
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn test_disabled_cache_always_loads() {
        let cache = ListCache::new("test", false, TTL);
        let calls = AtomicUsize::new(0);

        for value in ["a", "b"] {
            let list = cache
                .get_or_load(CacheScope::All, || load(&calls, value))
                .await
                .unwrap();
            assert_eq!(list, vec![value]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache = ListCache::new("test", true, TTL);
        let calls = AtomicUsize::new(0);

        cache
            .get_or_load(CacheScope::All, || load(&calls, "created"))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(299)).await;
        let fresh = cache
            .get_or_load(CacheScope::All, || load(&calls, "completed"))
            .await
            .unwrap();
        assert_eq!(fresh, vec!["created"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        let reloaded = cache
            .get_or_load(CacheScope::All, || load(&calls, "completed"))
            .await
            .unwrap();
        assert_eq!(reloaded, vec!["completed"]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len().await, 1);
    }

    #[test]
    fn test_scope_for_viewer() {
        let user = uuid::Uuid::now_v7();
        assert_eq!(CacheScope::for_viewer(user, true), CacheScope::All);
        assert_eq!(CacheScope::for_viewer(user, false).owner_filter(), Some(user));
    }
}
