//! In-memory listing store for testing.

use crate::error::{ListingError, Result};
use crate::providers::{
    ListQuery, ListingOverview, ListingStore, ListingTransaction, NewAuditRecord,
};
use crate::search::{CompiledSearch, SearchHit, haversine_km, listing_point, priced_rooms};
use crate::state::{
    AuditRecord, AuditRecordId, ImageId, ImagePayload, Listing, ListingAggregate, ListingId,
    ListingImage, ListingPayload, ListingStatus, Page, PageRequest, RoomId, RoomOffering,
    RoomPayload, UserId,
};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, Default)]
struct Tables {
    users: HashMap<UserId, String>,
    listings: BTreeMap<ListingId, Listing>,
    rooms: BTreeMap<RoomId, RoomOffering>,
    images: BTreeMap<ImageId, ListingImage>,
    audit_records: Vec<AuditRecord>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn live_listing(&self, id: ListingId) -> Option<&Listing> {
        self.listings.get(&id).filter(|l| !l.is_deleted)
    }

    fn live_rooms(&self, listing_id: ListingId) -> Vec<RoomOffering> {
        self.rooms
            .values()
            .filter(|r| r.listing_id == listing_id && !r.is_deleted)
            .cloned()
            .collect()
    }

    fn overview(&self, listing: &Listing) -> ListingOverview {
        let rooms = self.live_rooms(listing.id);
        ListingOverview {
            listing: listing.clone(),
            owner_name: self.users.get(&listing.owner_id).cloned().unwrap_or_default(),
            room_count: u32::try_from(rooms.len()).unwrap_or(u32::MAX),
            total_stock: rooms.iter().map(|r| u64::from(r.total_stock)).sum(),
            min_price: rooms.iter().map(|r| r.price).min(),
            primary_image: self.primary_image(listing.id),
        }
    }

    fn primary_image(&self, listing_id: ListingId) -> Option<String> {
        self.images
            .values()
            .find(|i| i.listing_id == listing_id && i.is_primary)
            .map(|i| i.url.clone())
    }

    /// Non-deleted listings, newest first.
    fn newest_first(&self) -> Vec<&Listing> {
        let mut listings: Vec<&Listing> =
            self.listings.values().filter(|l| !l.is_deleted).collect();
        listings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        listings
    }
}

fn paginate<T>(items: Vec<T>, page: PageRequest) -> Page<T> {
    let total = items.len() as u64;
    let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    let items = items
        .into_iter()
        .skip(offset)
        .take(page.page_size as usize)
        .collect();
    Page::new(items, total, page)
}

/// In-memory [`ListingStore`].
///
/// Transactions take an owned lock on the whole dataset and work on a staged
/// copy that replaces the live data on commit, so transactions are fully
/// serialized and a dropped transaction leaves no trace. Reads wait for any
/// open transaction to finish.
///
/// **WARNING**: Do NOT use in production. This is for testing only!
#[derive(Clone, Default)]
pub struct InMemoryListingStore {
    tables: Arc<Mutex<Tables>>,
    fail_commits: Arc<AtomicBool>,
    lose_commit_acks: Arc<AtomicBool>,
}

impl InMemoryListingStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user display name.
    pub async fn add_user(&self, id: UserId, name: &str) {
        self.tables.lock().await.users.insert(id, name.to_string());
    }

    /// Make every subsequent commit fail (and discard its changes).
    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent commit apply its changes but still report an
    /// error, as when the connection drops before the acknowledgement.
    pub fn set_lose_commit_acks(&self, lose: bool) {
        self.lose_commit_acks.store(lose, Ordering::SeqCst);
    }

    /// Raw listing row, including soft-deleted ones.
    pub async fn listing(&self, id: ListingId) -> Option<Listing> {
        self.tables.lock().await.listings.get(&id).cloned()
    }

    /// All room rows of a listing, including soft-deleted ones.
    pub async fn rooms(&self, listing_id: ListingId) -> Vec<RoomOffering> {
        self.tables
            .lock()
            .await
            .rooms
            .values()
            .filter(|r| r.listing_id == listing_id)
            .cloned()
            .collect()
    }

    /// Every listing row.
    pub async fn all_listings(&self) -> Vec<Listing> {
        self.tables.lock().await.listings.values().cloned().collect()
    }

    /// Every audit record, oldest first.
    pub async fn audit_records(&self) -> Vec<AuditRecord> {
        self.tables.lock().await.audit_records.clone()
    }
}

impl ListingStore for InMemoryListingStore {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> Result<Self::Tx> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let staged = guard.clone();
        Ok(InMemoryTransaction {
            guard,
            staged,
            fail_commit: Arc::clone(&self.fail_commits),
            lose_ack: Arc::clone(&self.lose_commit_acks),
        })
    }

    async fn load_listing(&self, id: ListingId) -> Result<Option<ListingAggregate>> {
        let tables = self.tables.lock().await;
        let Some(listing) = tables.live_listing(id) else {
            return Ok(None);
        };

        let mut images: Vec<ListingImage> = tables
            .images
            .values()
            .filter(|i| i.listing_id == id)
            .cloned()
            .collect();
        images.sort_by_key(|i| i.position);

        Ok(Some(ListingAggregate {
            listing: listing.clone(),
            owner_name: tables.users.get(&listing.owner_id).cloned().unwrap_or_default(),
            rooms: tables.live_rooms(id),
            images,
        }))
    }

    async fn list_listings(&self, query: &ListQuery, page: PageRequest) -> Result<Page<ListingOverview>> {
        let tables = self.tables.lock().await;
        let name = query
            .name
            .as_deref()
            .map(|n| n.trim().to_lowercase())
            .filter(|n| !n.is_empty());

        let matching: Vec<ListingOverview> = tables
            .newest_first()
            .into_iter()
            .filter(|l| query.owner.is_none_or(|owner| l.owner_id == owner))
            .filter(|l| query.hotel_type.as_ref().is_none_or(|t| &l.hotel_type == t))
            .filter(|l| query.status.is_none_or(|s| l.status == s))
            .filter(|l| name.as_ref().is_none_or(|n| l.name.to_lowercase().contains(n)))
            .map(|l| tables.overview(l))
            .collect();

        Ok(paginate(matching, page))
    }

    async fn search(&self, search: &CompiledSearch) -> Result<Page<SearchHit>> {
        let tables = self.tables.lock().await;

        let mut hits: Vec<SearchHit> = tables
            .listings
            .values()
            .filter_map(|listing| {
                let rooms = tables.live_rooms(listing.id);
                search.matches(listing, &rooms).then(|| SearchHit {
                    id: listing.id,
                    name: listing.name.clone(),
                    hotel_type: listing.hotel_type.clone(),
                    region: listing.region.clone(),
                    address: listing.address.clone(),
                    star_rating: listing.star_rating,
                    facilities: listing.facilities.clone(),
                    min_price: priced_rooms(&rooms).map(|r| r.price).min(),
                    primary_image: tables.primary_image(listing.id),
                    distance_km: search
                        .distance_from
                        .map(|center| haversine_km(center, listing_point(listing))),
                })
            })
            .collect();

        hits.sort_by(|a, b| search.order.compare(a, b));
        Ok(paginate(hits, search.page))
    }

    async fn featured_listings(&self, limit: u32) -> Result<Vec<ListingOverview>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .newest_first()
            .into_iter()
            .filter(|l| l.status == ListingStatus::Approved && l.is_featured)
            .take(limit as usize)
            .map(|l| tables.overview(l))
            .collect())
    }

    async fn status_counts(&self, owner: Option<UserId>) -> Result<Vec<(ListingStatus, u64)>> {
        let tables = self.tables.lock().await;
        let mut counts: HashMap<ListingStatus, u64> = HashMap::new();
        for listing in tables.newest_first() {
            if owner.is_none_or(|o| listing.owner_id == o) {
                *counts.entry(listing.status).or_default() += 1;
            }
        }
        Ok(counts.into_iter().collect())
    }

    async fn region_counts(&self, owner: Option<UserId>) -> Result<Vec<(String, u64)>> {
        let tables = self.tables.lock().await;
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for listing in tables.newest_first() {
            if owner.is_none_or(|o| listing.owner_id == o) {
                *counts.entry(listing.region.clone()).or_default() += 1;
            }
        }
        Ok(counts.into_iter().collect())
    }

    async fn audit_history(&self, listing_id: ListingId) -> Result<Vec<AuditRecord>> {
        let tables = self.tables.lock().await;
        let mut records: Vec<AuditRecord> = tables
            .audit_records
            .iter()
            .filter(|r| r.listing_id == listing_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(records)
    }
}

/// Transaction over [`InMemoryListingStore`].
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
    fail_commit: Arc<AtomicBool>,
    lose_ack: Arc<AtomicBool>,
}

impl InMemoryTransaction {
    fn room_mut(&mut self, listing_id: ListingId, room_id: RoomId) -> Option<&mut RoomOffering> {
        self.staged
            .rooms
            .get_mut(&room_id)
            .filter(|r| r.listing_id == listing_id && !r.is_deleted)
    }
}

fn apply_room(room: &mut RoomOffering, payload: &RoomPayload) {
    room.name.clone_from(&payload.name);
    room.bed_count = payload.bed_count;
    room.bed_size.clone_from(&payload.bed_size);
    room.area_sqm = payload.area_sqm;
    room.max_occupancy = payload.max_occupancy;
    room.floor_min = payload.floor_min;
    room.floor_max = payload.floor_max;
    room.image_url.clone_from(&payload.image_url);
    room.total_stock = payload.total_stock;
    room.price = payload.price;
    room.is_active = payload.is_active;
}

impl ListingTransaction for InMemoryTransaction {
    async fn lock_listing(&mut self, id: ListingId) -> Result<Option<Listing>> {
        Ok(self.staged.live_listing(id).cloned())
    }

    async fn insert_listing(&mut self, owner: UserId, payload: &ListingPayload) -> Result<ListingId> {
        let id = ListingId(self.staged.next_id());
        let now = Utc::now();
        self.staged.listings.insert(
            id,
            Listing {
                id,
                owner_id: owner,
                name: payload.name.clone(),
                hotel_type: payload.hotel_type.clone(),
                region: payload.region.clone(),
                address: payload.address.clone(),
                latitude: payload.latitude,
                longitude: payload.longitude,
                star_rating: payload.star_rating,
                facilities: payload.facility_tags(),
                description: payload.description.clone(),
                status: ListingStatus::Pending,
                rejection_reason: None,
                is_featured: payload.is_featured,
                is_deleted: false,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn update_listing_content(&mut self, id: ListingId, payload: &ListingPayload) -> Result<()> {
        let listing = self
            .staged
            .listings
            .get_mut(&id)
            .ok_or(ListingError::NotFound)?;
        listing.name.clone_from(&payload.name);
        listing.hotel_type.clone_from(&payload.hotel_type);
        listing.region.clone_from(&payload.region);
        listing.address.clone_from(&payload.address);
        listing.latitude = payload.latitude;
        listing.longitude = payload.longitude;
        listing.star_rating = payload.star_rating;
        listing.facilities = payload.facility_tags();
        listing.description.clone_from(&payload.description);
        listing.is_featured = payload.is_featured;
        listing.updated_at = Utc::now();
        Ok(())
    }

    async fn set_status(
        &mut self,
        id: ListingId,
        status: ListingStatus,
        rejection_reason: Option<String>,
    ) -> Result<()> {
        let listing = self
            .staged
            .listings
            .get_mut(&id)
            .ok_or(ListingError::NotFound)?;
        listing.status = status;
        listing.rejection_reason = rejection_reason;
        listing.updated_at = Utc::now();
        Ok(())
    }

    async fn room_ids(&mut self, listing_id: ListingId) -> Result<Vec<RoomId>> {
        Ok(self
            .staged
            .live_rooms(listing_id)
            .into_iter()
            .map(|r| r.id)
            .collect())
    }

    async fn insert_room(&mut self, listing_id: ListingId, room: &RoomPayload) -> Result<RoomId> {
        let id = RoomId(self.staged.next_id());
        let mut row = RoomOffering {
            id,
            listing_id,
            name: String::new(),
            bed_count: 0,
            bed_size: String::new(),
            area_sqm: 0.0,
            max_occupancy: 0,
            floor_min: 0,
            floor_max: 0,
            image_url: None,
            total_stock: 0,
            price: rust_decimal::Decimal::ZERO,
            is_active: true,
            is_deleted: false,
        };
        apply_room(&mut row, room);
        self.staged.rooms.insert(id, row);
        Ok(id)
    }

    async fn update_room(&mut self, listing_id: ListingId, room_id: RoomId, room: &RoomPayload) -> Result<()> {
        let row = self
            .room_mut(listing_id, room_id)
            .ok_or(ListingError::NotFound)?;
        apply_room(row, room);
        Ok(())
    }

    async fn soft_delete_rooms(&mut self, listing_id: ListingId, room_ids: &[RoomId]) -> Result<()> {
        for room_id in room_ids {
            if let Some(row) = self.room_mut(listing_id, *room_id) {
                row.is_deleted = true;
            }
        }
        Ok(())
    }

    async fn replace_images(&mut self, listing_id: ListingId, images: &[ImagePayload]) -> Result<()> {
        self.staged.images.retain(|_, i| i.listing_id != listing_id);
        for (position, image) in images.iter().enumerate() {
            let id = ImageId(self.staged.next_id());
            self.staged.images.insert(
                id,
                ListingImage {
                    id,
                    listing_id,
                    url: image.url.clone(),
                    position: u32::try_from(position).unwrap_or(u32::MAX),
                    is_primary: position == 0,
                },
            );
        }
        Ok(())
    }

    async fn append_audit_record(&mut self, record: NewAuditRecord) -> Result<AuditRecordId> {
        let id = AuditRecordId(self.staged.next_id());
        self.staged.audit_records.push(AuditRecord {
            id,
            listing_id: record.listing_id,
            actor_id: record.actor_id,
            action: record.action,
            reason: record.reason,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn update_room_stock(&mut self, listing_id: ListingId, room_id: RoomId, stock: u32) -> Result<bool> {
        Ok(self.room_mut(listing_id, room_id).is_some_and(|row| {
            row.total_stock = stock;
            true
        }))
    }

    async fn commit(self) -> Result<()> {
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(ListingError::Database("simulated commit failure".to_string()));
        }
        let Self {
            mut guard,
            staged,
            lose_ack,
            ..
        } = self;
        *guard = staged;
        if lose_ack.load(Ordering::SeqCst) {
            return Err(ListingError::Database("connection lost after commit".to_string()));
        }
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Principal;
    use rust_decimal::Decimal;

    fn payload() -> ListingPayload {
        ListingPayload {
            id: None,
            name: "Harbour View".to_string(),
            hotel_type: "business".to_string(),
            region: "Shanghai".to_string(),
            address: "1 Bund Rd".to_string(),
            latitude: 31.23,
            longitude: 121.47,
            star_rating: 4,
            facilities: vec![],
            description: None,
            is_featured: false,
            rooms: vec![],
            images: vec![],
        }
    }

    #[tokio::test]
    async fn test_dropped_transaction_leaves_no_trace() {
        let store = InMemoryListingStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_listing(Principal::merchant(1).id, &payload()).await.unwrap();
        }
        assert!(store.all_listings().await.is_empty());
    }

    #[tokio::test]
    async fn test_commit_publishes_changes() {
        let store = InMemoryListingStore::new();
        let mut tx = store.begin().await.unwrap();
        let id = tx.insert_listing(UserId(1), &payload()).await.unwrap();
        tx.commit().await.unwrap();

        let loaded = store.load_listing(id).await.unwrap().unwrap();
        assert_eq!(loaded.listing.status, ListingStatus::Pending);
    }

    #[tokio::test]
    async fn test_failed_commit_discards_changes() {
        let store = InMemoryListingStore::new();
        store.set_fail_commits(true);

        let mut tx = store.begin().await.unwrap();
        tx.insert_listing(UserId(1), &payload()).await.unwrap();
        assert!(tx.commit().await.is_err());
        assert!(store.all_listings().await.is_empty());
    }

    #[tokio::test]
    async fn test_lost_commit_ack_still_publishes_changes() {
        let store = InMemoryListingStore::new();
        store.set_lose_commit_acks(true);

        let mut tx = store.begin().await.unwrap();
        tx.insert_listing(UserId(1), &payload()).await.unwrap();
        assert!(tx.commit().await.is_err());
        assert_eq!(store.all_listings().await.len(), 1);
    }

    #[tokio::test]
    async fn test_stock_update_scoped_to_listing() {
        let store = InMemoryListingStore::new();
        let mut tx = store.begin().await.unwrap();
        let a = tx.insert_listing(UserId(1), &payload()).await.unwrap();
        let b = tx.insert_listing(UserId(1), &payload()).await.unwrap();
        let room = RoomPayload {
            id: None,
            name: "Std".to_string(),
            bed_count: 1,
            bed_size: "1.5m".to_string(),
            area_sqm: 18.0,
            max_occupancy: 2,
            floor_min: 1,
            floor_max: 1,
            image_url: None,
            total_stock: 2,
            price: Decimal::new(199, 0),
            is_active: true,
        };
        let room_of_b = tx.insert_room(b, &room).await.unwrap();

        assert!(!tx.update_room_stock(a, room_of_b, 9).await.unwrap());
        assert!(tx.update_room_stock(b, room_of_b, 9).await.unwrap());
        tx.commit().await.unwrap();

        assert_eq!(store.rooms(b).await[0].total_stock, 9);
    }
}
