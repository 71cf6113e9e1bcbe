//! # TripNest Favorites
//!
//! Client-resident favorites for festivals, market products and travel
//! spots:
//! - Canonical identity across screens that name the same entity by
//!   different id fields ([`resolver`])
//! - Optimistic toggles confirmed or rolled back by the backend ([`sync`])
//! - Snapshot fan-out to every observing screen ([`hub`])
//! - Startup hydration from local storage and the server ([`hydrate`])

pub mod cache;
pub mod error;
pub mod hub;
pub mod hydrate;
pub mod model;
pub mod persistence;
pub mod remote;
pub mod resolver;
pub mod service;
pub mod store;
pub mod sync;

pub use error::{FavoritesError, RemoteError, ResolutionError};
pub use hub::{FavoritesFilter, FavoritesSnapshot, Subscription};
pub use hydrate::{HydrationConflict, HydrationReport};
pub use model::{CanonicalKey, DisplayPayload, EntityRef, FavoriteRecord, MutationIntent, RawId};
pub use service::FavoritesService;
pub use sync::{PendingToggle, SyncPhase, ToggleOutcome};
pub use tripnest_common::events::DesiredState;
pub use tripnest_common::ItemType;
