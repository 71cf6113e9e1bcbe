//! Favorites data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tripnest_common::events::DesiredState;
use tripnest_common::ItemType;

use crate::error::ResolutionError;

/// A raw identifier as a screen supplied it: a JSON string or number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Text(String),
    Number(serde_json::Number),
}

impl RawId {
    /// String form used for identity, or `None` when the value is blank
    ///
    /// Strings are trimmed. Integral numbers render without a fractional
    /// part so `128211`, `128211.0` and `"128211"` are the same id.
    pub fn normalized(&self) -> Option<String> {
        let value = match self {
            RawId::Text(s) => s.trim().to_string(),
            RawId::Number(n) => normalize_number(n),
        };
        (!value.is_empty()).then_some(value)
    }
}

fn normalize_number(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        // 2^53: largest range where f64 holds every integer exactly
        Some(f) if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 => {
            (f as i64).to_string()
        }
        _ => n.to_string(),
    }
}

impl From<&str> for RawId {
    fn from(s: &str) -> Self {
        RawId::Text(s.to_string())
    }
}

impl From<String> for RawId {
    fn from(s: String) -> Self {
        RawId::Text(s)
    }
}

impl From<&String> for RawId {
    fn from(s: &String) -> Self {
        RawId::Text(s.clone())
    }
}

macro_rules! raw_id_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for RawId {
            fn from(n: $t) -> Self {
                RawId::Number(serde_json::Number::from(n))
            }
        })*
    };
}

raw_id_from_int!(i32, i64, u32, u64);

/// Identifier fields present on an entity; which ones exist varies by screen
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawIdentifiers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RawId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<RawId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contentid: Option<RawId>,
}

/// Denormalized display data so favorite lists render without a second fetch
///
/// Accepts the tour API field names as aliases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayPayload {
    #[serde(default, alias = "name", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(
        default,
        alias = "firstimage",
        alias = "image_url",
        skip_serializing_if = "Option::is_none"
    )]
    pub image: Option<String>,
    #[serde(
        default,
        alias = "addr1",
        alias = "address",
        skip_serializing_if = "Option::is_none"
    )]
    pub location: Option<String>,
    #[serde(default, alias = "eventstartdate", skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, alias = "eventenddate", skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

impl DisplayPayload {
    /// Fields of `self` win; gaps are filled from `base`
    pub fn merged_over(&self, base: &DisplayPayload) -> DisplayPayload {
        DisplayPayload {
            title: self.title.clone().or_else(|| base.title.clone()),
            image: self.image.clone().or_else(|| base.image.clone()),
            location: self.location.clone().or_else(|| base.location.clone()),
            start_date: self.start_date.clone().or_else(|| base.start_date.clone()),
            end_date: self.end_date.clone().or_else(|| base.end_date.clone()),
        }
    }
}

/// Heterogeneous description of a favoritable thing, as built by a screen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRef {
    pub item_type: ItemType,
    #[serde(flatten)]
    pub ids: RawIdentifiers,
    #[serde(flatten)]
    pub payload: DisplayPayload,
}

impl EntityRef {
    pub fn new(item_type: ItemType) -> Self {
        Self {
            item_type,
            ids: RawIdentifiers::default(),
            payload: DisplayPayload::default(),
        }
    }

    pub fn with_id(mut self, id: impl Into<RawId>) -> Self {
        self.ids.id = Some(id.into());
        self
    }

    pub fn with_item_id(mut self, id: impl Into<RawId>) -> Self {
        self.ids.item_id = Some(id.into());
        self
    }

    pub fn with_contentid(mut self, id: impl Into<RawId>) -> Self {
        self.ids.contentid = Some(id.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.payload.title = Some(title.into());
        self
    }

    pub fn with_payload(mut self, payload: DisplayPayload) -> Self {
        self.payload = payload;
        self
    }
}

/// Normalized identity of a favoritable entity
///
/// Equal keys mean the same favorite. String form is `<itemType>:<normalizedId>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct CanonicalKey {
    item_type: ItemType,
    normalized_id: String,
}

impl CanonicalKey {
    /// Build a key from an already-chosen id; blank ids are rejected
    pub fn new(item_type: ItemType, id: impl Into<RawId>) -> Result<Self, ResolutionError> {
        let normalized_id = id
            .into()
            .normalized()
            .ok_or(ResolutionError::MissingIdentifier { item_type })?;
        Ok(Self {
            item_type,
            normalized_id,
        })
    }

    pub fn item_type(&self) -> ItemType {
        self.item_type
    }

    pub fn normalized_id(&self) -> &str {
        &self.normalized_id
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.item_type, self.normalized_id)
    }
}

impl FromStr for CanonicalKey {
    type Err = ResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // ids may themselves contain ':', the type tag never does
        let (tag, id) = s
            .split_once(':')
            .ok_or_else(|| ResolutionError::MalformedKey(s.to_string()))?;
        let item_type = tag
            .parse::<ItemType>()
            .map_err(|_| ResolutionError::UnsupportedItemType(tag.to_string()))?;
        CanonicalKey::new(item_type, id)
    }
}

impl From<CanonicalKey> for String {
    fn from(key: CanonicalKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for CanonicalKey {
    type Error = ResolutionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A remote call for a key that is still in flight
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationIntent {
    pub key: CanonicalKey,
    pub desired_state: DesiredState,
    pub request_id: u64,
    pub started_at: DateTime<Utc>,
}

impl MutationIntent {
    pub fn new(key: CanonicalKey, desired_state: DesiredState, request_id: u64) -> Self {
        Self {
            key,
            desired_state,
            request_id,
            started_at: tripnest_common::time::now(),
        }
    }
}

/// Client-side favorite state for one key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoriteRecord {
    pub key: CanonicalKey,
    pub payload: DisplayPayload,
    pub confirmed_on_server: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_mutation: Option<MutationIntent>,
}

impl FavoriteRecord {
    /// Record already known to the server (hydration, persistence)
    pub fn confirmed(key: CanonicalKey, payload: DisplayPayload) -> Self {
        Self {
            key,
            payload,
            confirmed_on_server: true,
            pending_mutation: None,
        }
    }

    /// Optimistic view: hidden while a removal is in flight
    pub fn is_visible(&self) -> bool {
        self.pending_mutation
            .as_ref()
            .map_or(true, |intent| intent.desired_state.is_present())
    }
}
