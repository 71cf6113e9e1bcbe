//! Screen-facing favorites API
//!
//! One explicit object per signed-in session: construct on startup,
//! [`FavoritesService::hydrate`], and [`FavoritesService::teardown`] on logout.

use std::sync::Arc;
use tracing::info;
use tripnest_common::events::{EventBus, FavoritesEvent};
use tripnest_common::ItemType;

use crate::error::FavoritesError;
use crate::hub::{FavoritesFilter, FavoritesSnapshot, Subscription};
use crate::hydrate::{self, HydrationReport};
use crate::model::{CanonicalKey, EntityRef, FavoriteRecord, RawId};
use crate::persistence::PersistenceAdapter;
use crate::remote::RemoteFavoritesApi;
use crate::store::FavoritesStore;
use crate::sync::{PendingToggle, SyncCoordinator, SyncPhase};

#[derive(Clone)]
pub struct FavoritesService {
    coordinator: SyncCoordinator,
}

impl FavoritesService {
    pub fn new(
        remote: Arc<dyn RemoteFavoritesApi>,
        persistence: Arc<dyn PersistenceAdapter>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            coordinator: SyncCoordinator::new(FavoritesStore::new(), remote, persistence, events),
        }
    }

    /// Load persisted favorites, then reconcile with the server
    pub async fn hydrate(&self) -> HydrationReport {
        hydrate::hydrate(&self.coordinator).await
    }

    /// Flip a favorite; the returned handle carries the optimistic state now
    /// and the server's verdict later
    pub fn toggle_favorite(&self, entity: &EntityRef) -> Result<PendingToggle, FavoritesError> {
        self.coordinator.toggle(entity)
    }

    /// Optimistic membership; an unusable id is simply not a favorite
    pub fn is_favorite(&self, item_type: ItemType, raw_id: impl Into<RawId>) -> bool {
        match CanonicalKey::new(item_type, raw_id) {
            Ok(key) => self.is_favorite_key(&key),
            Err(_) => false,
        }
    }

    pub fn is_favorite_key(&self, key: &CanonicalKey) -> bool {
        self.coordinator.store().read(|state| state.cache.has(key))
    }

    /// Listener receives the current snapshot immediately, then one per
    /// matching mutation
    pub fn subscribe_favorites<F>(&self, filter: FavoritesFilter, listener: F) -> Subscription
    where
        F: Fn(&FavoritesSnapshot) + Send + Sync + 'static,
    {
        self.coordinator.store().subscribe(filter, Arc::new(listener))
    }

    /// Visible favorites in insertion order
    pub fn list_favorites(&self, item_type: Option<ItemType>) -> Vec<FavoriteRecord> {
        self.coordinator
            .store()
            .read(|state| state.cache.snapshot_all(item_type))
    }

    /// Raw record for a key, including one whose removal is in flight
    pub fn record(&self, key: &CanonicalKey) -> Option<FavoriteRecord> {
        self.coordinator
            .store()
            .read(|state| state.cache.get(key).cloned())
    }

    pub fn sync_phase(&self, key: &CanonicalKey) -> SyncPhase {
        self.coordinator.phase(key)
    }

    /// Logout: drop all favorites and abandon in-flight requests
    ///
    /// Responses still in flight will find no matching request and be
    /// discarded as stale.
    pub async fn teardown(&self) {
        self.coordinator.store().write(|state| {
            state.in_flight.clear();
            state.cache.clear();
        });
        self.coordinator.clear_persisted().await;
        self.coordinator
            .events()
            .emit_lossy(FavoritesEvent::FavoritesCleared {
                timestamp: tripnest_common::time::now(),
            });
        info!("Favorites cleared");
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }
}
