//! Shared favorites state and notification glue
//!
//! One lock guards the cache together with the in-flight mutation table, so
//! "read membership, decide, mutate" is a single atomic step. Notices queued
//! by the cache are drained after the state lock is released, strictly in
//! mutation order, by whichever thread got there first. Listeners may call
//! back into the store; nested mutations are picked up by the outer drain
//! loop instead of being delivered out of order.

use parking_lot::{Mutex, ReentrantMutex};
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::FavoritesCache;
use crate::hub::{FavoritesFilter, FavoritesSnapshot, Listener, Subscription, SubscriptionHub};
use crate::model::CanonicalKey;
use crate::sync::InFlight;

/// Everything mutated under the store lock
#[derive(Default)]
pub struct StoreState {
    pub cache: FavoritesCache,
    pub(crate) in_flight: HashMap<CanonicalKey, InFlight>,
    /// Highest request id whose response changed what we know of the server
    pub(crate) settled: HashMap<CanonicalKey, u64>,
    last_request_id: u64,
}

impl StoreState {
    pub fn has_pending(&self, key: &CanonicalKey) -> bool {
        self.in_flight.contains_key(key)
    }

    /// Allocate under the lock so ids follow the order mutations are applied
    pub(crate) fn next_request_id(&mut self) -> u64 {
        self.last_request_id += 1;
        self.last_request_id
    }

    pub(crate) fn last_request_id(&self) -> u64 {
        self.last_request_id
    }

    pub(crate) fn mark_settled(&mut self, key: &CanonicalKey, request_id: u64) {
        let entry = self.settled.entry(key.clone()).or_insert(request_id);
        *entry = (*entry).max(request_id);
    }
}

struct StoreInner {
    state: Mutex<StoreState>,
    hub: SubscriptionHub,
    /// Held while draining; the flag marks a drain in progress on this thread
    delivery: ReentrantMutex<Cell<bool>>,
}

#[derive(Clone)]
pub struct FavoritesStore {
    inner: Arc<StoreInner>,
}

impl Default for FavoritesStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FavoritesStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                state: Mutex::new(StoreState::default()),
                hub: SubscriptionHub::new(),
                delivery: ReentrantMutex::new(Cell::new(false)),
            }),
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&StoreState) -> R) -> R {
        let state = self.inner.state.lock();
        f(&state)
    }

    /// Mutate under the lock, then deliver the resulting notices
    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut StoreState) -> R) -> R {
        let result = {
            let mut state = self.inner.state.lock();
            f(&mut state)
        };
        self.flush();
        result
    }

    /// Register a listener and hand it the current snapshot immediately
    pub fn subscribe(&self, filter: FavoritesFilter, listener: Listener) -> Subscription {
        // no drain may interleave between registration and the initial snapshot
        let _delivery = self.inner.delivery.lock();

        let (subscription, initial) = {
            let state = self.inner.state.lock();
            let seq = state.cache.seq();
            let records = state.cache.snapshot_all(None);
            let subscription = self
                .inner
                .hub
                .register(filter.clone(), Arc::clone(&listener), seq);
            (subscription, FavoritesSnapshot::from_records(seq, filter, &records))
        };

        listener(&initial);
        subscription
    }

    pub fn hub(&self) -> &SubscriptionHub {
        &self.inner.hub
    }

    fn flush(&self) {
        let delivery = self.inner.delivery.lock();
        if delivery.get() {
            // outer drain on this thread will deliver it in order
            return;
        }
        let _draining = DrainFlag::set(&delivery);

        loop {
            let notice = self.inner.state.lock().cache.pop_notice();
            match notice {
                Some(notice) => self.inner.hub.deliver(&notice),
                None => break,
            }
        }
    }
}

/// Clears the drain flag even if a listener panics
struct DrainFlag<'a>(&'a Cell<bool>);

impl<'a> DrainFlag<'a> {
    fn set(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for DrainFlag<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DisplayPayload, FavoriteRecord};
    use tripnest_common::ItemType;

    fn record(id: &str) -> FavoriteRecord {
        FavoriteRecord::confirmed(
            CanonicalKey::new(ItemType::Festival, id).unwrap(),
            DisplayPayload::default(),
        )
    }

    #[test]
    fn test_subscribe_delivers_initial_snapshot() {
        let store = FavoritesStore::new();
        store.write(|s| s.cache.upsert(record("1")));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = store.subscribe(
            FavoritesFilter::All,
            Arc::new(move |snap: &FavoritesSnapshot| sink.lock().push(snap.len())),
        );

        assert_eq!(*seen.lock(), vec![1]);
        store.write(|s| s.cache.upsert(record("2")));
        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[test]
    fn test_listener_can_read_store_during_delivery() {
        let store = FavoritesStore::new();
        let key = CanonicalKey::new(ItemType::Festival, "1").unwrap();

        let observed = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&observed);
        let reader = store.clone();
        let probe = key.clone();
        let _sub = store.subscribe(
            FavoritesFilter::All,
            Arc::new(move |_snap: &FavoritesSnapshot| {
                sink.lock().push(reader.read(|s| s.cache.has(&probe)));
            }),
        );

        store.write(|s| s.cache.upsert(record("1")));
        assert_eq!(*observed.lock(), vec![false, true]);
    }

    #[test]
    fn test_nested_mutation_is_delivered_in_order() {
        let store = FavoritesStore::new();
        let first_seen = Arc::new(Mutex::new(Vec::new()));
        let second_seen = Arc::new(Mutex::new(Vec::new()));

        // first listener reacts to the first record by adding a second one
        let writer = store.clone();
        let sink = Arc::clone(&first_seen);
        let _first = store.subscribe(
            FavoritesFilter::All,
            Arc::new(move |snap: &FavoritesSnapshot| {
                sink.lock().push(snap.seq());
                if snap.len() == 1 {
                    writer.write(|s| s.cache.upsert(record("2")));
                }
            }),
        );
        let sink = Arc::clone(&second_seen);
        let _second = store.subscribe(
            FavoritesFilter::All,
            Arc::new(move |snap: &FavoritesSnapshot| sink.lock().push(snap.seq())),
        );

        store.write(|s| s.cache.upsert(record("1")));

        assert_eq!(*first_seen.lock(), vec![0, 1, 2]);
        assert_eq!(*second_seen.lock(), vec![0, 1, 2]);
    }
}
