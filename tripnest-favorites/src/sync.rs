//! Optimistic favorite mutations
//!
//! A toggle flips the cached membership immediately, dispatches the remote
//! call, and later commits or rolls back. Per key, only the most recent
//! request is authoritative: a toggle while one is in flight supersedes it,
//! and the superseded response is discarded when it arrives.
//!
//! States per key:
//!
//! ```text
//!   Idle --toggle--> OptimisticallyAdded | OptimisticallyRemoved
//!   Optimistically* --success--> Idle (confirmed_on_server = true)
//!   Optimistically* --failure--> Idle (reverted to server-known membership)
//!   Optimistically* --toggle--> Reconciling --latest result--> Idle
//! ```

use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use tripnest_common::events::{DesiredState, EventBus, FavoritesEvent};

use crate::error::{FavoritesError, RemoteError};
use crate::model::{CanonicalKey, EntityRef, FavoriteRecord, MutationIntent};
use crate::persistence::PersistenceAdapter;
use crate::remote::{RemoteAck, RemoteFavoritesApi, ToggleRequest};
use crate::resolver;
use crate::store::FavoritesStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    OptimisticallyAdded,
    OptimisticallyRemoved,
    /// A newer toggle superseded a request that is still in flight
    Reconciling,
}

/// Bookkeeping for a key with a request in flight
#[derive(Debug, Clone)]
pub(crate) struct InFlight {
    pub(crate) phase: SyncPhase,
    pub(crate) latest: MutationIntent,
    /// Last server-known membership, restored if the latest request fails
    pub(crate) baseline: Option<FavoriteRecord>,
}

/// Final result of one toggle request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// This request was the latest and the server accepted it
    Confirmed {
        key: CanonicalKey,
        state: DesiredState,
        ack: RemoteAck,
    },
    /// A newer request for the key made this response irrelevant
    Superseded {
        key: CanonicalKey,
        request_id: u64,
        latest_request_id: Option<u64>,
    },
}

/// Optimistic result of a toggle, with the confirmation still to come
#[derive(Debug)]
pub struct PendingToggle {
    key: CanonicalKey,
    desired: DesiredState,
    request_id: u64,
    superseded: Option<u64>,
    confirmation: oneshot::Receiver<Result<ToggleOutcome, FavoritesError>>,
}

impl PendingToggle {
    pub fn key(&self) -> &CanonicalKey {
        &self.key
    }

    pub fn desired(&self) -> DesiredState {
        self.desired
    }

    /// Membership the UI should show right now
    pub fn is_favorite(&self) -> bool {
        self.desired.is_present()
    }

    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// Request id this toggle superseded, if one was in flight
    pub fn superseded_request(&self) -> Option<u64> {
        self.superseded
    }

    /// Wait for the server's verdict
    ///
    /// Dropping the `PendingToggle` instead does not cancel the request.
    pub async fn outcome(self) -> Result<ToggleOutcome, FavoritesError> {
        let key = self.key.to_string();
        self.confirmation
            .await
            .unwrap_or(Err(FavoritesError::ConfirmationLost(key)))
    }
}

enum Settlement {
    Stale { latest: Option<u64> },
    Committed,
    Reverted { restored: DesiredState },
}

/// Serializes mutations per key and folds remote results into the cache
#[derive(Clone)]
pub struct SyncCoordinator {
    store: FavoritesStore,
    remote: Arc<dyn RemoteFavoritesApi>,
    persistence: Arc<dyn PersistenceAdapter>,
    events: Arc<EventBus>,
    persist_lock: Arc<tokio::sync::Mutex<()>>,
}

impl SyncCoordinator {
    pub fn new(
        store: FavoritesStore,
        remote: Arc<dyn RemoteFavoritesApi>,
        persistence: Arc<dyn PersistenceAdapter>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            remote,
            persistence,
            events,
            persist_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Flip membership optimistically and dispatch the remote call
    ///
    /// Fails synchronously, without touching the cache, when the entity has
    /// no usable identifier. Must be called inside a Tokio runtime.
    pub fn toggle(&self, entity: &EntityRef) -> Result<PendingToggle, FavoritesError> {
        let key = resolver::resolve_entity(entity)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| FavoritesError::Runtime(e.to_string()))?;

        let (request_id, desired, superseded) = self.store.write(|state| {
            let request_id = state.next_request_id();
            let existing = state.cache.get(&key).cloned();
            let current = if existing.as_ref().is_some_and(FavoriteRecord::is_visible) {
                DesiredState::Present
            } else {
                DesiredState::Absent
            };
            let desired = current.flipped();
            let intent = MutationIntent::new(key.clone(), desired, request_id);

            let superseded = match state.in_flight.get_mut(&key) {
                Some(flight) => {
                    let previous = flight.latest.request_id;
                    flight.latest = intent.clone();
                    flight.phase = SyncPhase::Reconciling;
                    Some(previous)
                }
                None => {
                    let baseline = existing
                        .as_ref()
                        .filter(|r| r.is_visible())
                        .map(|r| FavoriteRecord {
                            pending_mutation: None,
                            ..r.clone()
                        });
                    let phase = match desired {
                        DesiredState::Present => SyncPhase::OptimisticallyAdded,
                        DesiredState::Absent => SyncPhase::OptimisticallyRemoved,
                    };
                    state.in_flight.insert(
                        key.clone(),
                        InFlight {
                            phase,
                            latest: intent.clone(),
                            baseline,
                        },
                    );
                    None
                }
            };

            let record = match (desired, existing) {
                // removal keeps the record, hidden, until the server agrees
                (DesiredState::Absent, Some(existing)) => FavoriteRecord {
                    pending_mutation: Some(intent),
                    ..existing
                },
                (_, existing) => {
                    let confirmed_on_server = existing.as_ref().is_some_and(|r| r.confirmed_on_server);
                    let base = existing.map(|r| r.payload).unwrap_or_default();
                    FavoriteRecord {
                        key: key.clone(),
                        payload: entity.payload.merged_over(&base),
                        confirmed_on_server,
                        pending_mutation: Some(intent),
                    }
                }
            };
            state.cache.upsert(record);

            (request_id, desired, superseded)
        });

        debug!(
            "Optimistic {:?} for {} (request {}, superseded {:?})",
            desired, key, request_id, superseded
        );
        self.events.emit_lossy(FavoritesEvent::FavoriteToggled {
            item_type: key.item_type(),
            canonical_key: key.to_string(),
            desired,
            request_id,
            superseded: superseded.is_some(),
            timestamp: tripnest_common::time::now(),
        });

        let (tx, rx) = oneshot::channel();
        let coordinator = self.clone();
        let task_key = key.clone();
        runtime.spawn(async move {
            let request = ToggleRequest::from(&task_key);
            let result = coordinator.remote.set_favorite(&request, desired).await;
            let outcome = coordinator.settle(task_key, request_id, desired, result).await;
            // the caller may have dropped its PendingToggle
            let _ = tx.send(outcome);
        });

        Ok(PendingToggle {
            key,
            desired,
            request_id,
            superseded,
            confirmation: rx,
        })
    }

    /// Current state-machine phase for a key
    pub fn phase(&self, key: &CanonicalKey) -> SyncPhase {
        self.store.read(|state| {
            state
                .in_flight
                .get(key)
                .map_or(SyncPhase::Idle, |flight| flight.phase)
        })
    }

    async fn settle(
        &self,
        key: CanonicalKey,
        request_id: u64,
        desired: DesiredState,
        result: Result<RemoteAck, RemoteError>,
    ) -> Result<ToggleOutcome, FavoritesError> {
        let settlement = self.store.write(|state| {
            let latest = state.in_flight.get(&key).map(|f| f.latest.request_id);
            if latest != Some(request_id) {
                // discarded for the UI, but the server did apply it
                if let (Some(flight), Ok(_)) = (state.in_flight.get_mut(&key), &result) {
                    flight.baseline = match desired {
                        DesiredState::Present => {
                            let payload = state
                                .cache
                                .get(&key)
                                .map(|r| r.payload.clone())
                                .or_else(|| flight.baseline.as_ref().map(|b| b.payload.clone()))
                                .unwrap_or_default();
                            Some(FavoriteRecord::confirmed(key.clone(), payload))
                        }
                        DesiredState::Absent => None,
                    };
                }
                if result.is_ok() && latest.is_some() {
                    state.mark_settled(&key, request_id);
                }
                return Settlement::Stale { latest };
            }

            state.mark_settled(&key, request_id);
            let baseline = state.in_flight.remove(&key).and_then(|flight| flight.baseline);
            match &result {
                Ok(_) => {
                    match desired {
                        DesiredState::Present => {
                            if let Some(record) = state.cache.get(&key).cloned() {
                                state.cache.upsert(FavoriteRecord {
                                    confirmed_on_server: true,
                                    pending_mutation: None,
                                    ..record
                                });
                            }
                        }
                        DesiredState::Absent => {
                            state.cache.remove(&key);
                        }
                    }
                    Settlement::Committed
                }
                Err(_) => {
                    let restored = match baseline {
                        Some(record) => {
                            state.cache.upsert(record);
                            DesiredState::Present
                        }
                        None => {
                            state.cache.remove(&key);
                            DesiredState::Absent
                        }
                    };
                    Settlement::Reverted { restored }
                }
            }
        });

        let timestamp = tripnest_common::time::now();
        match settlement {
            Settlement::Stale { latest } => {
                debug!(
                    "Discarding stale response for {} (request {}, latest {:?})",
                    key, request_id, latest
                );
                self.events.emit_lossy(FavoritesEvent::StaleResponseDiscarded {
                    canonical_key: key.to_string(),
                    request_id,
                    latest_request_id: latest,
                    timestamp,
                });
                Ok(ToggleOutcome::Superseded {
                    key,
                    request_id,
                    latest_request_id: latest,
                })
            }
            Settlement::Committed => {
                let ack = result.unwrap_or(RemoteAck::Applied);
                info!("Favorite {} confirmed as {:?} ({:?})", key, desired, ack);
                self.persist().await;
                self.events.emit_lossy(FavoritesEvent::FavoriteConfirmed {
                    item_type: key.item_type(),
                    canonical_key: key.to_string(),
                    state: desired,
                    request_id,
                    timestamp,
                });
                Ok(ToggleOutcome::Confirmed {
                    key,
                    state: desired,
                    ack,
                })
            }
            Settlement::Reverted { restored } => {
                let source = match result {
                    Err(source) => source,
                    Ok(_) => RemoteError::Network("unknown failure".to_string()),
                };
                warn!("Reverting favorite {} to {:?}: {}", key, restored, source);
                self.persist().await;
                self.events.emit_lossy(FavoritesEvent::FavoriteReverted {
                    item_type: key.item_type(),
                    canonical_key: key.to_string(),
                    restored,
                    request_id,
                    reason: source.to_string(),
                    timestamp,
                });
                Err(FavoritesError::RemoteRejection {
                    key: key.to_string(),
                    source,
                })
            }
        }
    }

    /// Write the server-known set; saves never overtake one another
    pub(crate) async fn persist(&self) {
        let _guard = self.persist_lock.lock().await;
        let records = self.store.read(|state| state.cache.confirmed_records());
        if let Err(e) = self.persistence.save(&records).await {
            warn!("Failed to persist favorites: {}", e);
        }
    }

    pub(crate) async fn clear_persisted(&self) {
        let _guard = self.persist_lock.lock().await;
        if let Err(e) = self.persistence.clear().await {
            warn!("Failed to clear persisted favorites: {}", e);
        }
    }

    pub fn store(&self) -> &FavoritesStore {
        &self.store
    }

    pub(crate) fn remote(&self) -> &Arc<dyn RemoteFavoritesApi> {
        &self.remote
    }

    pub(crate) fn persistence(&self) -> &Arc<dyn PersistenceAdapter> {
        &self.persistence
    }

    pub(crate) fn events(&self) -> &Arc<EventBus> {
        &self.events
    }
}
