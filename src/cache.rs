use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use moka::future::Cache;
use serde_json::Value;
use uuid::Uuid;

use crate::realtime::{Change, Table};

/// What a cached read is keyed on besides its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    All,
    User(Uuid),
    Offer(Uuid),
    UserOffer(Uuid, Uuid),
}

impl Scope {
    fn matches(&self, change: &Change) -> bool {
        use Scope::*;
        match *self {
            All => true,
            User(user) => change.users.contains(&user),
            // changes not tied to an offer (profile edits) reach every offer
            Offer(offer) => change.offer_id.is_none_or(|id| id == offer),
            UserOffer(user, offer) => change.users.contains(&user) && change.offer_id == Some(offer),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub name: &'static str,
    pub scope: Scope,
}

impl QueryKey {
    pub fn new(name: &'static str, scope: Scope) -> Self {
        Self { name, scope }
    }
}

/// Names of the cached reads that depend on a table.
pub fn dependents(table: Table) -> &'static [&'static str] {
    use Table::*;
    match table {
        Profiles => &["profile", "offers", "offer-applications", "completed-offers"],
        Offers => &["offers", "offer", "user-offers", "pending-offers", "completed-offers", "user-stats"],
        OfferApplications => &["offer-applications", "user-application", "user-applications", "pending-offers"],
        Transactions => &["completed-offers", "user-stats"],
        TimeBalances => &["time-balance", "user-stats"],
    }
}

/// Read cache for the JSON views, invalidated from the change feed.
#[derive(Clone)]
pub struct QueryCache {
    inner: Cache<QueryKey, Arc<Value>>,
    /// Bumped by every invalidation. A load that saw another generation may
    /// hold pre-change data and must not stay cached.
    generation: Arc<AtomicU64>,
}

impl QueryCache {
    pub fn new() -> Self {
        let inner = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(Duration::from_secs(5 * 60))
            .build();
        Self { inner, generation: Arc::new(AtomicU64::new(0)) }
    }

    pub async fn get(&self, key: &QueryKey) -> Option<Arc<Value>> {
        self.inner.get(key).await
    }

    pub async fn insert(&self, key: QueryKey, value: Value) -> Arc<Value> {
        let value = Arc::new(value);
        self.inner.insert(key, value.clone()).await;
        value
    }

    /// Returns the cached value or runs `load` and caches its result.
    /// Errors are not cached.
    pub async fn get_or_load<F, Fut, E>(&self, key: QueryKey, load: F) -> Result<Arc<Value>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, E>>,
    {
        if let Some(hit) = self.get(&key).await {
            tracing::trace!(name = key.name, "cache hit");
            return Ok(hit);
        }

        let started = self.generation.load(Ordering::Acquire);
        let value = Arc::new(load().await?);
        if self.generation.load(Ordering::Acquire) != started {
            tracing::trace!(name = key.name, "invalidated during load, not cached");
            return Ok(value);
        }

        self.inner.insert(key.clone(), value.clone()).await;
        // an invalidation may have listed the entries just before this insert
        if self.generation.load(Ordering::Acquire) != started {
            self.inner.invalidate(&key).await;
        }
        Ok(value)
    }

    /// Drops every entry that depends on the changed table and whose scope
    /// covers the changed row. Returns how many were dropped.
    pub async fn invalidate(&self, change: &Change) -> usize {
        self.generation.fetch_add(1, Ordering::AcqRel);
        let names = dependents(change.table);
        let stale: Vec<QueryKey> = self
            .inner
            .iter()
            .filter(|(key, _)| names.contains(&key.name) && key.scope.matches(change))
            .map(|(key, _)| (*key).clone())
            .collect();

        for key in &stale {
            self.inner.invalidate(key).await;
        }
        if !stale.is_empty() {
            tracing::debug!(table = %change.table, count = stale.len(), "invalidated cached queries");
        }
        stale.len()
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::realtime::ChangeKind;

    fn change(table: Table, offer_id: Option<Uuid>, users: Vec<Uuid>) -> Change {
        Change {
            table,
            event: ChangeKind::Update,
            id: Uuid::now_v7(),
            offer_id,
            users,
        }
    }

    #[tokio::test]
    async fn load_once_then_hit() {
        let cache = QueryCache::new();
        let key = QueryKey::new("offers", Scope::All);

        let first = cache
            .get_or_load(key.clone(), || async { Ok::<_, ()>(json!([1])) })
            .await
            .unwrap();
        let second = cache
            .get_or_load(key, || async { Ok::<_, ()>(json!([2])) })
            .await
            .unwrap();

        assert_eq!(*first, json!([1]));
        assert_eq!(*second, json!([1]));
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let cache = QueryCache::new();
        let key = QueryKey::new("offers", Scope::All);

        let failed = cache.get_or_load(key.clone(), || async { Err::<Value, _>("db down") }).await;
        assert!(failed.is_err());
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn invalidation_is_scoped_to_the_user() {
        let cache = QueryCache::new();
        let alice = Uuid::now_v7();
        let bob = Uuid::now_v7();
        let alice_key = QueryKey::new("time-balance", Scope::User(alice));
        let bob_key = QueryKey::new("time-balance", Scope::User(bob));
        cache.insert(alice_key.clone(), json!(30)).await;
        cache.insert(bob_key.clone(), json!(30)).await;

        let dropped = cache.invalidate(&change(Table::TimeBalances, None, vec![alice])).await;

        assert_eq!(dropped, 1);
        assert!(cache.get(&alice_key).await.is_none());
        assert!(cache.get(&bob_key).await.is_some());
    }

    #[tokio::test]
    async fn invalidation_is_scoped_to_the_offer() {
        let cache = QueryCache::new();
        let offer = Uuid::now_v7();
        let other = Uuid::now_v7();
        let key = QueryKey::new("offer-applications", Scope::Offer(offer));
        let other_key = QueryKey::new("offer-applications", Scope::Offer(other));
        let listing = QueryKey::new("offers", Scope::All);
        cache.insert(key.clone(), json!([])).await;
        cache.insert(other_key.clone(), json!([])).await;
        cache.insert(listing.clone(), json!([])).await;

        cache.invalidate(&change(Table::OfferApplications, Some(offer), vec![])).await;

        assert!(cache.get(&key).await.is_none());
        assert!(cache.get(&other_key).await.is_some());
        // applications don't feed the explore listing
        assert!(cache.get(&listing).await.is_some());
    }

    #[tokio::test]
    async fn user_offer_scope_needs_both() {
        let cache = QueryCache::new();
        let user = Uuid::now_v7();
        let offer = Uuid::now_v7();
        let key = QueryKey::new("user-application", Scope::UserOffer(user, offer));
        cache.insert(key.clone(), json!(null)).await;

        cache.invalidate(&change(Table::OfferApplications, Some(offer), vec![Uuid::now_v7()])).await;
        assert!(cache.get(&key).await.is_some());

        cache.invalidate(&change(Table::OfferApplications, Some(offer), vec![user])).await;
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn profile_change_reaches_offer_scoped_names() {
        let cache = QueryCache::new();
        let user = Uuid::now_v7();
        let key = QueryKey::new("offer-applications", Scope::Offer(Uuid::now_v7()));
        let balance = QueryKey::new("time-balance", Scope::User(user));
        cache.insert(key.clone(), json!([])).await;
        cache.insert(balance.clone(), json!(30)).await;

        cache.invalidate(&change(Table::Profiles, None, vec![user])).await;

        assert!(cache.get(&key).await.is_none());
        assert!(cache.get(&balance).await.is_some());
    }

    #[tokio::test]
    async fn load_racing_an_invalidation_is_not_cached() {
        let cache = QueryCache::new();
        let user = Uuid::now_v7();
        let key = QueryKey::new("time-balance", Scope::User(user));

        let loaded = cache
            .get_or_load(key.clone(), || async {
                // the row was read, then a write landed before the insert
                cache.invalidate(&change(Table::TimeBalances, None, vec![user])).await;
                Ok::<_, ()>(json!({ "balance": 30 }))
            })
            .await
            .unwrap();

        assert_eq!(*loaded, json!({ "balance": 30 }));
        assert!(cache.get(&key).await.is_none());

        let fresh = cache
            .get_or_load(key.clone(), || async { Ok::<_, ()>(json!({ "balance": 27 })) })
            .await
            .unwrap();
        assert_eq!(*fresh, json!({ "balance": 27 }));
        assert_eq!(*cache.get(&key).await.unwrap(), json!({ "balance": 27 }));
    }
}
