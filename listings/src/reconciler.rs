//! Inventory reconciler.
//!
//! Applies a merchant's submitted listing to stored state inside one
//! transaction:
//!
//! 1. Authorize: an existing listing must be owned by the caller, else it
//!    is reported as not found.
//! 2. Upsert the listing and force it back to `pending` (content edits
//!    always require re-moderation).
//! 3. Three-way diff of rooms: matched ids are updated in place, ids
//!    missing from the payload are soft-deleted, rooms without an id (or
//!    with an id that is not persisted) are inserted.
//! 4. Replace images wholesale.
//!
//! Rooms and images are treated differently on purpose: room ids are
//! referenced by stock updates and outlive edits, image rows are not
//! referenced by anything and are cheaper to rewrite.
//!
//! The narrower [`update_stock`] path edits stock on published listings
//! without touching status, content or images.

use crate::error::{ListingError, Result};
use crate::providers::ListingTransaction;
use crate::state::{
    Listing, ListingId, ListingPayload, ListingStatus, Principal, RoomId, RoomPayload, StockUpdate,
    UserId,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Room diff between persisted ids and a submitted room list.
#[derive(Debug, PartialEq)]
pub struct RoomPlan<'a> {
    /// Persisted rooms to update in place.
    pub updates: Vec<(RoomId, &'a RoomPayload)>,
    /// Rooms to insert.
    pub inserts: Vec<&'a RoomPayload>,
    /// Persisted rooms absent from the payload, to soft-delete.
    pub deletes: Vec<RoomId>,
}

/// Compute the three-way room diff.
///
/// Submission order is preserved for updates and inserts; deletes follow
/// the order of `existing`.
#[must_use]
pub fn plan_rooms<'a>(existing: &[RoomId], incoming: &'a [RoomPayload]) -> RoomPlan<'a> {
    let persisted: HashSet<RoomId> = existing.iter().copied().collect();
    let mut kept = HashSet::new();
    let mut updates = Vec::new();
    let mut inserts = Vec::new();

    for room in incoming {
        match room.id {
            Some(id) if persisted.contains(&id) => {
                kept.insert(id);
                updates.push((id, room));
            }
            _ => inserts.push(room),
        }
    }

    let deletes = existing
        .iter()
        .copied()
        .filter(|id| !kept.contains(id))
        .collect();

    RoomPlan {
        updates,
        inserts,
        deletes,
    }
}

/// Result of a committed listing save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveOutcome {
    /// Saved listing.
    pub listing_id: ListingId,
    /// Owner of the listing.
    pub owner_id: UserId,
    /// `true` if the listing was created by this save.
    pub created: bool,
    /// Rooms updated in place.
    pub rooms_updated: Vec<RoomId>,
    /// Rooms inserted.
    pub rooms_created: Vec<RoomId>,
    /// Rooms soft-deleted.
    pub rooms_deleted: Vec<RoomId>,
}

/// Lock a listing and check that `owner` owns it.
///
/// Missing, deleted and foreign listings are indistinguishable to the caller.
async fn lock_owned<T: ListingTransaction>(
    tx: &mut T,
    listing_id: ListingId,
    owner: &Principal,
) -> Result<Listing> {
    match tx.lock_listing(listing_id).await? {
        Some(listing) if listing.owner_id == owner.id => Ok(listing),
        Some(_) => {
            tracing::info!(
                listing_id = %listing_id,
                principal_id = %owner.id,
                "Denied access to listing owned by another merchant"
            );
            Err(ListingError::NotFound)
        }
        None => Err(ListingError::NotFound),
    }
}

/// Save a validated listing payload within `tx`.
///
/// The caller commits on `Ok` and rolls back on `Err`.
///
/// # Errors
///
/// - [`ListingError::NotFound`] if `payload.id` names a listing that does not
///   exist or is not owned by `owner`
/// - Infrastructure errors from the transaction
pub async fn save_listing<T: ListingTransaction>(
    tx: &mut T,
    owner: &Principal,
    payload: &ListingPayload,
) -> Result<SaveOutcome> {
    let (listing_id, created) = match payload.id {
        Some(id) => {
            lock_owned(tx, id, owner).await?;
            tx.update_listing_content(id, payload).await?;
            (id, false)
        }
        None => (tx.insert_listing(owner.id, payload).await?, true),
    };

    tx.set_status(listing_id, ListingStatus::Pending, None).await?;

    let existing = tx.room_ids(listing_id).await?;
    let plan = plan_rooms(&existing, &payload.rooms);

    for (room_id, room) in &plan.updates {
        tx.update_room(listing_id, *room_id, room).await?;
    }

    let mut rooms_created = Vec::with_capacity(plan.inserts.len());
    for room in &plan.inserts {
        rooms_created.push(tx.insert_room(listing_id, room).await?);
    }

    if !plan.deletes.is_empty() {
        tx.soft_delete_rooms(listing_id, &plan.deletes).await?;
    }

    tx.replace_images(listing_id, &payload.images).await?;

    Ok(SaveOutcome {
        listing_id,
        owner_id: owner.id,
        created,
        rooms_updated: plan.updates.iter().map(|(id, _)| *id).collect(),
        rooms_created,
        rooms_deleted: plan.deletes,
    })
}

/// Per-room result of a stock update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum StockItemResult {
    /// Stock written.
    Applied {
        /// Room updated
        room_id: RoomId,
        /// New stock
        new_stock: u32,
    },
    /// Room does not belong to the listing (or is deleted); nothing written.
    Skipped {
        /// Room named in the request
        room_id: RoomId,
    },
}

/// Result of a committed stock update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReport {
    /// Listing updated.
    pub listing_id: ListingId,
    /// Owner of the listing.
    pub owner_id: UserId,
    /// One entry per requested room, in request order.
    pub items: Vec<StockItemResult>,
}

impl StockReport {
    /// Number of rooms whose stock was written.
    #[must_use]
    pub fn applied_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(item, StockItemResult::Applied { .. }))
            .count()
    }
}

/// Update room stock of a published listing within `tx`.
///
/// Rooms that do not belong to the listing are skipped and reported, not
/// treated as an error for the whole batch.
///
/// # Errors
///
/// - [`ListingError::NotFound`] if the listing does not exist or is not owned by `owner`
/// - [`ListingError::StockEditNotAllowed`] if the listing is not `approved`
/// - Infrastructure errors from the transaction
pub async fn update_stock<T: ListingTransaction>(
    tx: &mut T,
    owner: &Principal,
    listing_id: ListingId,
    updates: &[StockUpdate],
) -> Result<StockReport> {
    let listing = lock_owned(tx, listing_id, owner).await?;

    if listing.status != ListingStatus::Approved {
        return Err(ListingError::StockEditNotAllowed {
            current: listing.status,
        });
    }

    let mut items = Vec::with_capacity(updates.len());
    for update in updates {
        let applied = tx
            .update_room_stock(listing_id, update.room_id, update.new_stock)
            .await?;
        items.push(if applied {
            StockItemResult::Applied {
                room_id: update.room_id,
                new_stock: update.new_stock,
            }
        } else {
            tracing::warn!(
                listing_id = %listing_id,
                room_id = %update.room_id,
                "Skipped stock update for room outside listing"
            );
            StockItemResult::Skipped {
                room_id: update.room_id,
            }
        });
    }

    Ok(StockReport {
        listing_id,
        owner_id: listing.owner_id,
        items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    fn room(id: Option<i64>) -> RoomPayload {
        RoomPayload {
            id: id.map(RoomId),
            name: format!("room-{id:?}"),
            bed_count: 1,
            bed_size: "1.5m".to_string(),
            area_sqm: 20.0,
            max_occupancy: 2,
            floor_min: 1,
            floor_max: 2,
            image_url: None,
            total_stock: 5,
            price: Decimal::new(300, 0),
            is_active: true,
        }
    }

    #[test]
    fn test_plan_creates_all_when_nothing_persisted() {
        let incoming = vec![room(None), room(None)];
        let plan = plan_rooms(&[], &incoming);

        assert!(plan.updates.is_empty());
        assert_eq!(plan.inserts.len(), 2);
        assert!(plan.deletes.is_empty());
    }

    #[test]
    fn test_plan_three_way_diff() {
        let existing = [RoomId(1), RoomId(2), RoomId(3)];
        let incoming = vec![room(Some(2)), room(None), room(Some(99))];
        let plan = plan_rooms(&existing, &incoming);

        assert_eq!(plan.updates.len(), 1);
        assert_eq!(plan.updates[0].0, RoomId(2));
        // Unknown id 99 is treated as new.
        assert_eq!(plan.inserts.len(), 2);
        assert_eq!(plan.deletes, vec![RoomId(1), RoomId(3)]);
    }

    #[test]
    fn test_plan_unchanged_set_is_a_no_op() {
        let existing = [RoomId(5), RoomId(6)];
        let incoming = vec![room(Some(6)), room(Some(5))];
        let plan = plan_rooms(&existing, &incoming);

        assert_eq!(plan.updates.len(), 2);
        assert!(plan.inserts.is_empty());
        assert!(plan.deletes.is_empty());
    }

    proptest! {
        /// After applying a plan, the active room set is exactly the matched
        /// ids plus one fresh room per insert, and nothing persisted is lost
        /// without being deleted.
        #[test]
        fn prop_plan_partitions_rooms(
            existing in proptest::collection::hash_set(1i64..40, 0..12),
            incoming_ids in proptest::collection::vec(proptest::option::of(1i64..60), 0..12),
        ) {
            let existing: Vec<RoomId> = existing.into_iter().map(RoomId).collect();
            let mut seen = HashSet::new();
            let incoming: Vec<RoomPayload> = incoming_ids
                .into_iter()
                .filter(|id| id.is_none_or(|id| seen.insert(id)))
                .map(room)
                .collect();

            let plan = plan_rooms(&existing, &incoming);

            let persisted: HashSet<RoomId> = existing.iter().copied().collect();
            let updated: HashSet<RoomId> = plan.updates.iter().map(|(id, _)| *id).collect();
            let deleted: HashSet<RoomId> = plan.deletes.iter().copied().collect();
            let submitted: HashSet<RoomId> = incoming.iter().filter_map(|r| r.id).collect();

            prop_assert_eq!(plan.updates.len() + plan.inserts.len(), incoming.len());
            prop_assert!(updated.is_disjoint(&deleted));
            prop_assert_eq!(updated.union(&deleted).copied().collect::<HashSet<_>>(), persisted.clone());
            prop_assert_eq!(updated, submitted.intersection(&persisted).copied().collect::<HashSet<_>>());
        }
    }
}
