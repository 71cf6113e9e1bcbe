//! Error types for the favorites subsystem

use thiserror::Error;
use tripnest_common::ItemType;

/// Entity could not be canonicalized
///
/// Fatal to the requested operation: no favorite is ever recorded under a
/// generated or placeholder id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("No usable identifier for {item_type} entity (checked contentid, item_id, id)")]
    MissingIdentifier { item_type: ItemType },

    #[error("Unsupported item type: {0}")]
    UnsupportedItemType(String),

    #[error("Malformed canonical key: {0}")]
    MalformedKey(String),
}

/// Failure talking to the favorites backend
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Not authenticated (HTTP {0})")]
    Unauthenticated(u16),

    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Response decode error: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else {
            RemoteError::Network(err.to_string())
        }
    }
}

/// Errors surfaced to screens
#[derive(Debug, Error)]
pub enum FavoritesError {
    /// Synchronous: the entity has no stable key
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// Asynchronous: the optimistic change was reverted
    #[error("Could not save favorite {key}: {source}")]
    RemoteRejection {
        key: String,
        #[source]
        source: RemoteError,
    },

    #[error("Persistence error: {0}")]
    Persistence(#[from] tripnest_common::Error),

    /// No Tokio runtime to run the confirmation on
    #[error("Runtime unavailable: {0}")]
    Runtime(String),

    /// The confirmation task ended without reporting (runtime shut down)
    #[error("Confirmation for {0} was lost")]
    ConfirmationLost(String),
}

impl FavoritesError {
    /// Whether the UI should show the transient "try again" notification
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            FavoritesError::Resolution(_) | FavoritesError::RemoteRejection { .. }
        )
    }
}
