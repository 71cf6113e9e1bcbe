//! Startup hydration
//!
//! Order: persisted set → cache (as confirmed) → remote list → reconcile.
//! The server wins for every key without a local mutation; keys with one
//! are left alone. "With one" covers mutations still in flight and those
//! that started or settled while the persisted set or the remote list was
//! being fetched, since that data may predate them.

use indexmap::IndexMap;
use std::collections::HashSet;
use tracing::{debug, info, warn};
use tripnest_common::events::FavoritesEvent;

use crate::cache::CacheOp;
use crate::model::{CanonicalKey, FavoriteRecord};
use crate::store::StoreState;
use crate::sync::SyncCoordinator;

/// Local and remote sets disagreed about a key with no pending mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HydrationConflict {
    /// Server has it, local cache did not; added
    MissingLocally(CanonicalKey),
    /// Local cache had it, server does not; removed
    MissingRemotely(CanonicalKey),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HydrationReport {
    /// Records loaded from local persistence
    pub restored: usize,
    pub added: usize,
    pub removed: usize,
    /// Keys a local mutation kept unchanged during reconciliation
    pub skipped_pending: usize,
    /// Remote entries that could not be canonicalized
    pub unresolvable: usize,
    pub remote_reconciled: bool,
    pub conflicts: Vec<HydrationConflict>,
}

/// Populate the cache from persistence, then reconcile against the server
///
/// Never fails: a persistence or remote problem is logged and hydration
/// continues with what it has.
pub async fn hydrate(coordinator: &SyncCoordinator) -> HydrationReport {
    let mut report = HydrationReport::default();
    let store = coordinator.store();

    let before_load = store.read(Watermark::capture);
    let persisted = match coordinator.persistence().load().await {
        Ok(records) => records,
        Err(e) => {
            warn!("Could not load persisted favorites, starting empty: {}", e);
            Vec::new()
        }
    };

    report.restored = store.write(|state| {
        let ops: Vec<CacheOp> = persisted
            .into_iter()
            .filter(|r| before_load.trust(state, &r.key) == Trust::Server)
            .map(CacheOp::Upsert)
            .collect();
        state.cache.apply(ops)
    });
    debug!("Restored {} favorites from local storage", report.restored);

    let before_fetch = store.read(Watermark::capture);
    let remote = match coordinator.remote().list_favorites().await {
        Ok(list) => list,
        Err(e) => {
            warn!("Favorites list unavailable, keeping local state: {}", e);
            finish(coordinator, &report);
            return report;
        }
    };

    let mut server_records: IndexMap<CanonicalKey, FavoriteRecord> = IndexMap::new();
    for favorite in remote {
        match favorite.canonical_key() {
            Ok(key) => match server_records.get_mut(&key) {
                Some(listed) => {
                    debug!("Server listed {} more than once", key);
                    listed.payload = listed.payload.merged_over(&favorite.payload);
                }
                None => {
                    let record = FavoriteRecord::confirmed(key.clone(), favorite.payload);
                    server_records.insert(key, record);
                }
            },
            Err(e) => {
                warn!("Ignoring server favorite {:?}: {}", favorite.item_id, e);
                report.unresolvable += 1;
            }
        }
    }

    store.write(|state| {
        let server_keys: HashSet<CanonicalKey> = server_records.keys().cloned().collect();
        let mut ops = Vec::new();

        for record in server_records.into_values() {
            match before_fetch.trust(state, &record.key) {
                Trust::Server => {}
                Trust::Baseline => {
                    // a failed local mutation falls back to what the server says
                    if let Some(flight) = state.in_flight.get_mut(&record.key) {
                        flight.baseline = Some(record);
                    }
                    report.skipped_pending += 1;
                    continue;
                }
                Trust::Local => {
                    report.skipped_pending += 1;
                    continue;
                }
            }
            match state.cache.get(&record.key) {
                Some(local) => {
                    let payload = record.payload.merged_over(&local.payload);
                    if !local.confirmed_on_server || payload != local.payload {
                        ops.push(CacheOp::Upsert(FavoriteRecord::confirmed(record.key, payload)));
                    }
                }
                None => {
                    report.conflicts.push(HydrationConflict::MissingLocally(record.key.clone()));
                    report.added += 1;
                    ops.push(CacheOp::Upsert(record));
                }
            }
        }

        let stale_local: Vec<CanonicalKey> = state
            .cache
            .keys()
            .filter(|k| !server_keys.contains(*k))
            .cloned()
            .collect();
        for key in stale_local {
            match before_fetch.trust(state, &key) {
                Trust::Server => {}
                Trust::Baseline => {
                    if let Some(flight) = state.in_flight.get_mut(&key) {
                        flight.baseline = None;
                    }
                    report.skipped_pending += 1;
                    continue;
                }
                Trust::Local => {
                    report.skipped_pending += 1;
                    continue;
                }
            }
            report.conflicts.push(HydrationConflict::MissingRemotely(key.clone()));
            report.removed += 1;
            ops.push(CacheOp::Remove(key));
        }

        state.cache.apply(ops);
    });

    for conflict in &report.conflicts {
        debug!("Hydration conflict resolved in favor of server: {:?}", conflict);
    }

    report.remote_reconciled = true;
    coordinator.persist().await;
    finish(coordinator, &report);
    report
}

/// How far fetched data may be trusted for one key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trust {
    /// No local mutation since the fetch began
    Server,
    /// Still the same in-flight mutation as when the fetch began; the data
    /// only replaces its rollback target
    Baseline,
    /// Mutated since the fetch began; the data may predate it
    Local,
}

/// Mutation state captured just before an await
struct Watermark {
    last_request_id: u64,
    pending: HashSet<CanonicalKey>,
}

impl Watermark {
    fn capture(state: &StoreState) -> Self {
        Self {
            last_request_id: state.last_request_id(),
            pending: state.in_flight.keys().cloned().collect(),
        }
    }

    fn trust(&self, state: &StoreState, key: &CanonicalKey) -> Trust {
        let settled_since = state
            .settled
            .get(key)
            .is_some_and(|id| *id > self.last_request_id);
        let was_pending = self.pending.contains(key);

        match state.in_flight.get(key) {
            Some(flight)
                if was_pending
                    && !settled_since
                    && flight.latest.request_id <= self.last_request_id =>
            {
                Trust::Baseline
            }
            Some(_) => Trust::Local,
            None if was_pending || settled_since => Trust::Local,
            None => Trust::Server,
        }
    }
}

fn finish(coordinator: &SyncCoordinator, report: &HydrationReport) {
    info!(
        "Favorites hydrated: {} restored, {} added, {} removed, {} pending untouched (remote {})",
        report.restored,
        report.added,
        report.removed,
        report.skipped_pending,
        if report.remote_reconciled { "reconciled" } else { "unavailable" }
    );
    coordinator.events().emit_lossy(FavoritesEvent::HydrationCompleted {
        restored: report.restored,
        added: report.added,
        removed: report.removed,
        remote_reconciled: report.remote_reconciled,
        timestamp: tripnest_common::time::now(),
    });
}
