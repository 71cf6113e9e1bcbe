//! Subscription hub
//!
//! Fan-out of cache changes to screens. Listeners always receive a full
//! snapshot scoped to their filter, never a delta, so a listener that was
//! busy or subscribed late cannot drift from the cache.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tripnest_common::ItemType;

use crate::cache::{ChangeScope, Notice};
use crate::model::{CanonicalKey, FavoriteRecord};

/// What a listener wants to observe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FavoritesFilter {
    All,
    ItemType(ItemType),
    Key(CanonicalKey),
}

impl FavoritesFilter {
    pub fn matches_key(&self, key: &CanonicalKey) -> bool {
        match self {
            FavoritesFilter::All => true,
            FavoritesFilter::ItemType(t) => key.item_type() == *t,
            FavoritesFilter::Key(k) => k == key,
        }
    }

    fn matches_scope(&self, scope: &ChangeScope) -> bool {
        match scope {
            ChangeScope::All => true,
            ChangeScope::Keys(keys) => keys.iter().any(|k| self.matches_key(k)),
        }
    }
}

/// Immutable view of the visible favorites relevant to one filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FavoritesSnapshot {
    seq: u64,
    filter: FavoritesFilter,
    records: Vec<FavoriteRecord>,
}

impl FavoritesSnapshot {
    pub(crate) fn from_records(seq: u64, filter: FavoritesFilter, all: &[FavoriteRecord]) -> Self {
        let records = all
            .iter()
            .filter(|r| filter.matches_key(&r.key))
            .cloned()
            .collect();
        Self {
            seq,
            filter,
            records,
        }
    }

    /// Cache mutation sequence number this snapshot reflects
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn filter(&self) -> &FavoritesFilter {
        &self.filter
    }

    pub fn contains(&self, key: &CanonicalKey) -> bool {
        self.records.iter().any(|r| &r.key == key)
    }

    pub fn records(&self) -> &[FavoriteRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub type Listener = Arc<dyn Fn(&FavoritesSnapshot) + Send + Sync>;

struct Entry {
    id: u64,
    filter: FavoritesFilter,
    /// Notices at or below this sequence predate the initial snapshot
    registered_at: u64,
    listener: Listener,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: Vec<Entry>,
}

/// Listener registry; holds no cache state of its own
#[derive(Clone, Default)]
pub struct SubscriptionHub {
    registry: Arc<Mutex<Registry>>,
}

impl SubscriptionHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(
        &self,
        filter: FavoritesFilter,
        listener: Listener,
        registered_at: u64,
    ) -> Subscription {
        let mut registry = self.registry.lock();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.entries.push(Entry {
            id,
            filter,
            registered_at,
            listener,
        });

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
            active: AtomicBool::new(true),
        }
    }

    /// Synchronously deliver one notice to every matching listener
    ///
    /// The registry lock is not held while listeners run, so a listener may
    /// subscribe, unsubscribe or read favorites from inside the callback.
    pub(crate) fn deliver(&self, notice: &Notice) {
        let targets: Vec<(u64, FavoritesFilter, Listener)> = {
            let registry = self.registry.lock();
            registry
                .entries
                .iter()
                .filter(|e| e.registered_at < notice.seq && e.filter.matches_scope(&notice.scope))
                .map(|e| (e.id, e.filter.clone(), Arc::clone(&e.listener)))
                .collect()
        };

        for (id, filter, listener) in targets {
            // an earlier listener in this pass may have unsubscribed it
            if !self.is_registered(id) {
                continue;
            }
            let snapshot = FavoritesSnapshot::from_records(notice.seq, filter, &notice.records);
            listener(&snapshot);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.registry.lock().entries.len()
    }

    fn is_registered(&self, id: u64) -> bool {
        self.registry.lock().entries.iter().any(|e| e.id == id)
    }
}

/// Handle returned by subscribe; dropping it unsubscribes
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
    active: AtomicBool,
}

impl Subscription {
    /// Stop delivery; safe to call any number of times
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().entries.retain(|e| e.id != self.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DisplayPayload;
    use std::sync::atomic::AtomicUsize;

    fn key(item_type: ItemType, id: &str) -> CanonicalKey {
        CanonicalKey::new(item_type, id).unwrap()
    }

    fn notice(seq: u64, scope: ChangeScope, keys: &[CanonicalKey]) -> Notice {
        Notice {
            seq,
            scope,
            records: Arc::new(
                keys.iter()
                    .map(|k| FavoriteRecord::confirmed(k.clone(), DisplayPayload::default()))
                    .collect(),
            ),
        }
    }

    fn counting_listener(counter: &Arc<AtomicUsize>) -> Listener {
        let counter = Arc::clone(counter);
        Arc::new(move |_snapshot: &FavoritesSnapshot| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_filter_scoping() {
        let festival = key(ItemType::Festival, "1");
        let spot = key(ItemType::Spot, "1");

        assert!(FavoritesFilter::All.matches_key(&spot));
        assert!(FavoritesFilter::ItemType(ItemType::Festival).matches_key(&festival));
        assert!(!FavoritesFilter::ItemType(ItemType::Festival).matches_key(&spot));
        assert!(FavoritesFilter::Key(spot.clone()).matches_key(&spot));
        assert!(!FavoritesFilter::Key(spot).matches_key(&festival));
    }

    #[test]
    fn test_deliver_only_to_matching_listeners() {
        let hub = SubscriptionHub::new();
        let festival = key(ItemType::Festival, "1");

        let all = Arc::new(AtomicUsize::new(0));
        let festivals = Arc::new(AtomicUsize::new(0));
        let products = Arc::new(AtomicUsize::new(0));
        let _a = hub.register(FavoritesFilter::All, counting_listener(&all), 0);
        let _f = hub.register(
            FavoritesFilter::ItemType(ItemType::Festival),
            counting_listener(&festivals),
            0,
        );
        let _p = hub.register(
            FavoritesFilter::ItemType(ItemType::Product),
            counting_listener(&products),
            0,
        );

        hub.deliver(&notice(1, ChangeScope::Keys(vec![festival.clone()]), &[festival]));
        assert_eq!(all.load(Ordering::SeqCst), 1);
        assert_eq!(festivals.load(Ordering::SeqCst), 1);
        assert_eq!(products.load(Ordering::SeqCst), 0);

        hub.deliver(&notice(2, ChangeScope::All, &[]));
        assert_eq!(products.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_notices_before_registration_are_skipped() {
        let hub = SubscriptionHub::new();
        let count = Arc::new(AtomicUsize::new(0));
        let _s = hub.register(FavoritesFilter::All, counting_listener(&count), 5);

        hub.deliver(&notice(5, ChangeScope::All, &[]));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        hub.deliver(&notice(6, ChangeScope::All, &[]));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_is_idempotent_and_runs_on_drop() {
        let hub = SubscriptionHub::new();
        let count = Arc::new(AtomicUsize::new(0));

        let sub = hub.register(FavoritesFilter::All, counting_listener(&count), 0);
        assert_eq!(hub.listener_count(), 1);
        sub.unsubscribe();
        sub.unsubscribe();
        assert!(!sub.is_active());
        assert_eq!(hub.listener_count(), 0);

        {
            let _scoped = hub.register(FavoritesFilter::All, counting_listener(&count), 0);
            assert_eq!(hub.listener_count(), 1);
        }
        assert_eq!(hub.listener_count(), 0);

        hub.deliver(&notice(1, ChangeScope::All, &[]));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unsubscribe_after_hub_dropped() {
        let hub = SubscriptionHub::new();
        let sub = hub.register(FavoritesFilter::All, Arc::new(|_: &FavoritesSnapshot| {}), 0);
        drop(hub);
        sub.unsubscribe();
    }

    #[test]
    fn test_snapshot_scoped_to_filter() {
        let a = key(ItemType::Festival, "1");
        let b = key(ItemType::Product, "2");
        let records = vec![
            FavoriteRecord::confirmed(a.clone(), DisplayPayload::default()),
            FavoriteRecord::confirmed(b.clone(), DisplayPayload::default()),
        ];

        let snapshot = FavoritesSnapshot::from_records(3, FavoritesFilter::Key(b.clone()), &records);
        assert_eq!(snapshot.seq(), 3);
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains(&b));
        assert!(!snapshot.contains(&a));
    }
}
