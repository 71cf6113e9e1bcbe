//! # TripNest Common Library
//!
//! Shared code for the TripNest client crates including:
//! - Content type tags shared by festivals, market products and spots
//! - Event types (FavoritesEvent enum) and the EventBus
//! - Configuration loading
//! - Local database initialization
//! - Utility functions

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod time;
pub mod types;

pub use error::{Error, Result};
pub use types::ItemType;
