//! Entity key resolution
//!
//! Maps a heterogeneous entity payload to its [`CanonicalKey`]. Pure and
//! deterministic, which is what lets a list row, a detail view and a map
//! marker agree on identity without coordinating.

use tripnest_common::ItemType;

use crate::error::ResolutionError;
use crate::model::{CanonicalKey, EntityRef, RawId, RawIdentifiers};

/// Identifier field names, in the order they are consulted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdField {
    ContentId,
    ItemId,
    Id,
}

impl IdField {
    fn pick(self, ids: &RawIdentifiers) -> Option<&RawId> {
        match self {
            IdField::ContentId => ids.contentid.as_ref(),
            IdField::ItemId => ids.item_id.as_ref(),
            IdField::Id => ids.id.as_ref(),
        }
    }
}

/// Field priority per item type
///
/// Festivals come from the tour API where `contentid` is authoritative;
/// products and spots come from our own backend where `id` is.
pub fn id_priority(item_type: ItemType) -> [IdField; 3] {
    match item_type {
        ItemType::Festival => [IdField::ContentId, IdField::ItemId, IdField::Id],
        ItemType::Product | ItemType::Spot => [IdField::Id, IdField::ItemId, IdField::ContentId],
    }
}

/// Resolve raw identifier fields to a canonical key
///
/// The first present, non-blank field in priority order wins. Fails with
/// [`ResolutionError::MissingIdentifier`] when none is usable.
pub fn resolve(item_type: ItemType, ids: &RawIdentifiers) -> Result<CanonicalKey, ResolutionError> {
    id_priority(item_type)
        .into_iter()
        .filter_map(|field| field.pick(ids))
        .find_map(|raw| CanonicalKey::new(item_type, raw.clone()).ok())
        .ok_or(ResolutionError::MissingIdentifier { item_type })
}

/// Resolve an [`EntityRef`] built by a screen
pub fn resolve_entity(entity: &EntityRef) -> Result<CanonicalKey, ResolutionError> {
    resolve(entity.item_type, &entity.ids)
}
