mod ws;

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::cache::QueryCache;

pub use ws::{realtime_ws, RealtimeQuery};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Profiles,
    Offers,
    OfferApplications,
    Transactions,
    TimeBalances,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        use Table::*;
        match self {
            Profiles => "profiles",
            Offers => "offers",
            OfferApplications => "offer_applications",
            Transactions => "transactions",
            TimeBalances => "time_balances",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use Table::*;
        match s.trim() {
            "profiles" => Ok(Profiles),
            "offers" => Ok(Offers),
            "offer_applications" => Ok(OfferApplications),
            "transactions" => Ok(Transactions),
            "time_balances" => Ok(TimeBalances),
            other => Err(format!("unknown table {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A row-level change notification. Carries ids only, never row data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub table: Table,
    pub event: ChangeKind,
    /// Primary key of the changed row (`user_id` for balances).
    pub id: Uuid,
    /// Offer the row belongs to, when there is one.
    pub offer_id: Option<Uuid>,
    /// Users the change concerns.
    pub users: Vec<Uuid>,
}

impl Change {
    pub fn new(table: Table, event: ChangeKind, id: Uuid) -> Self {
        Self { table, event, id, offer_id: None, users: Vec::new() }
    }

    pub fn offer(mut self, offer_id: Uuid) -> Self {
        self.offer_id = Some(offer_id);
        self
    }

    pub fn users(mut self, users: impl IntoIterator<Item = Uuid>) -> Self {
        for user in users {
            if !self.users.contains(&user) {
                self.users.push(user);
            }
        }
        self
    }

    pub fn balance(user_id: Uuid) -> Self {
        Self::new(Table::TimeBalances, ChangeKind::Update, user_id).users([user_id])
    }
}

/// What a subscriber wants to hear about. Empty means everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub tables: Vec<Table>,
    pub offer_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}

impl Filter {
    pub fn matches(&self, change: &Change) -> bool {
        if !self.tables.is_empty() && !self.tables.contains(&change.table) {
            return false;
        }
        if let Some(offer_id) = self.offer_id {
            if change.offer_id != Some(offer_id) {
                return false;
            }
        }
        if let Some(user_id) = self.user_id {
            if !change.users.contains(&user_id) {
                return false;
            }
        }
        true
    }

    /// Parses `offers,time_balances` style lists.
    pub fn parse_tables(raw: &str) -> Result<Vec<Table>, String> {
        raw.split(',')
            .filter(|s| !s.trim().is_empty())
            .map(Table::from_str)
            .collect()
    }
}

/// Change feed shared by every request. Publishing drops stale cache entries
/// first, so a read that follows a write never sees the old value.
#[derive(Clone)]
pub struct Hub {
    tx: broadcast::Sender<Change>,
    cache: QueryCache,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            tx: broadcast::channel(CHANNEL_CAPACITY).0,
            cache: QueryCache::new(),
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Change> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub async fn publish(&self, change: Change) {
        self.cache.invalidate(&change).await;
        tracing::debug!(table = %change.table, event = ?change.event, id = %change.id, "change");
        // no subscribers is fine
        let _ = self.tx.send(change);
    }

    pub async fn publish_all(&self, changes: impl IntoIterator<Item = Change>) {
        for change in changes {
            self.publish(change).await;
        }
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}
