//! In-memory favorites cache
//!
//! Owns every [`FavoriteRecord`], at most one per [`CanonicalKey`], in
//! insertion order. The cache has no locking of its own; [`crate::store`]
//! wraps it. Every mutator queues a [`Notice`] carrying the post-mutation
//! snapshot, so observers can only ever see state the cache has committed to.

use indexmap::IndexMap;
use std::collections::VecDeque;
use std::sync::Arc;
use tripnest_common::ItemType;

use crate::model::{CanonicalKey, FavoriteRecord};

/// Which keys a mutation touched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeScope {
    Keys(Vec<CanonicalKey>),
    All,
}

/// Queued notification for one committed mutation
#[derive(Debug, Clone)]
pub struct Notice {
    /// Monotonic mutation sequence number
    pub seq: u64,
    pub scope: ChangeScope,
    /// Visible records after the mutation, in insertion order
    pub records: Arc<Vec<FavoriteRecord>>,
}

/// Single batched cache operation
#[derive(Debug, Clone)]
pub enum CacheOp {
    Upsert(FavoriteRecord),
    Remove(CanonicalKey),
}

#[derive(Debug, Default)]
pub struct FavoritesCache {
    records: IndexMap<CanonicalKey, FavoriteRecord>,
    outbox: VecDeque<Notice>,
    seq: u64,
}

impl FavoritesCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw record, including one whose removal is still in flight
    pub fn get(&self, key: &CanonicalKey) -> Option<&FavoriteRecord> {
        self.records.get(key)
    }

    /// Optimistic membership: a record pending removal already reads as absent
    pub fn has(&self, key: &CanonicalKey) -> bool {
        self.records.get(key).is_some_and(FavoriteRecord::is_visible)
    }

    /// Insert or replace; replacing keeps the original position
    pub fn upsert(&mut self, record: FavoriteRecord) {
        let key = record.key.clone();
        self.records.insert(key.clone(), record);
        self.queue_notice(ChangeScope::Keys(vec![key]));
    }

    pub fn remove(&mut self, key: &CanonicalKey) -> Option<FavoriteRecord> {
        let removed = self.records.shift_remove(key);
        if removed.is_some() {
            self.queue_notice(ChangeScope::Keys(vec![key.clone()]));
        }
        removed
    }

    /// Apply several operations under one notification
    ///
    /// Returns the number of operations that changed the cache.
    pub fn apply(&mut self, ops: Vec<CacheOp>) -> usize {
        let mut touched = Vec::new();
        for op in ops {
            match op {
                CacheOp::Upsert(record) => {
                    touched.push(record.key.clone());
                    self.records.insert(record.key.clone(), record);
                }
                CacheOp::Remove(key) => {
                    if self.records.shift_remove(&key).is_some() {
                        touched.push(key);
                    }
                }
            }
        }

        let changed = touched.len();
        if changed > 0 {
            self.queue_notice(ChangeScope::Keys(touched));
        }
        changed
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.queue_notice(ChangeScope::All);
    }

    /// Visible records in insertion order, optionally scoped to one type
    pub fn snapshot_all(&self, item_type: Option<ItemType>) -> Vec<FavoriteRecord> {
        self.records
            .values()
            .filter(|r| r.is_visible())
            .filter(|r| item_type.map_or(true, |t| r.key.item_type() == t))
            .cloned()
            .collect()
    }

    /// Server-known records for persistence, pending intents stripped
    ///
    /// A record whose removal is still in flight is included; one whose
    /// add has not been confirmed is not.
    pub fn confirmed_records(&self) -> Vec<FavoriteRecord> {
        self.records
            .values()
            .filter(|r| r.confirmed_on_server)
            .map(|r| FavoriteRecord {
                pending_mutation: None,
                ..r.clone()
            })
            .collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = &CanonicalKey> {
        self.records.keys()
    }

    /// Number of stored records (visible or not)
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sequence number of the latest committed mutation
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn pop_notice(&mut self) -> Option<Notice> {
        self.outbox.pop_front()
    }

    fn queue_notice(&mut self, scope: ChangeScope) {
        self.seq += 1;
        let records = Arc::new(self.snapshot_all(None));
        self.outbox.push_back(Notice {
            seq: self.seq,
            scope,
            records,
        });
    }
}
