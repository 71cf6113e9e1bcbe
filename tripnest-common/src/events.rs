//! Event types for the TripNest event system
//!
//! Provides the favorites event definitions and the EventBus used to fan them
//! out to app-wide side channels (toast layer, analytics, debug overlay).

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::ItemType;

/// Desired membership carried by a favorite mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesiredState {
    Present,
    Absent,
}

impl DesiredState {
    /// The opposite membership
    pub fn flipped(self) -> Self {
        match self {
            DesiredState::Present => DesiredState::Absent,
            DesiredState::Absent => DesiredState::Present,
        }
    }

    pub fn is_present(self) -> bool {
        matches!(self, DesiredState::Present)
    }
}

/// Favorites event types
///
/// Events are broadcast via EventBus and can be serialized for logging or
/// forwarding to a UI bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FavoritesEvent {
    /// Optimistic change applied, remote request dispatched
    ///
    /// Triggers:
    /// - Debug overlay: show in-flight request
    FavoriteToggled {
        item_type: ItemType,
        /// Canonical key string form (`<itemType>:<normalizedId>`)
        canonical_key: String,
        desired: DesiredState,
        request_id: u64,
        /// Whether this request superseded one still in flight
        superseded: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Server confirmed the latest desired state for a key
    FavoriteConfirmed {
        item_type: ItemType,
        canonical_key: String,
        state: DesiredState,
        request_id: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Remote call failed and the optimistic change was rolled back
    ///
    /// Triggers:
    /// - Toast: "could not save, try again"
    FavoriteReverted {
        item_type: ItemType,
        canonical_key: String,
        /// Membership the key was restored to
        restored: DesiredState,
        request_id: u64,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Response for a superseded request arrived and was ignored
    StaleResponseDiscarded {
        canonical_key: String,
        request_id: u64,
        /// Latest request id for the key, if any request is still tracked
        latest_request_id: Option<u64>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Startup hydration finished
    HydrationCompleted {
        restored: usize,
        added: usize,
        removed: usize,
        remote_reconciled: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// All favorites dropped (logout)
    FavoritesCleared {
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<FavoritesEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<FavoritesEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: FavoritesEvent,
    ) -> Result<usize, broadcast::error::SendError<FavoritesEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: FavoritesEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
