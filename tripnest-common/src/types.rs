//! Content type tags shared across screens and services

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Kind of content a user can mark as a favorite
///
/// Serialized in the backend's wire form (`FESTIVAL`, `PRODUCT`, `SPOT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemType {
    /// Festival listing (tour API content)
    Festival,
    /// Local-goods marketplace product
    Product,
    /// Recommended travel spot
    Spot,
}

impl ItemType {
    /// All supported item types, in display order
    pub const ALL: [ItemType; 3] = [ItemType::Festival, ItemType::Product, ItemType::Spot];

    /// Wire tag used by the backend and in canonical key strings
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Festival => "FESTIVAL",
            ItemType::Product => "PRODUCT",
            ItemType::Spot => "SPOT",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = Error;

    /// Case-insensitive: screens send both `festival` and `FESTIVAL`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FESTIVAL" => Ok(ItemType::Festival),
            "PRODUCT" => Ok(ItemType::Product),
            "SPOT" => Ok(ItemType::Spot),
            other => Err(Error::InvalidInput(format!("Unsupported item type: {}", other))),
        }
    }
}
