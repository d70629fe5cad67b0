//! Relational listing storage traits.
//!
//! [`ListingStore`] serves read queries and opens transactions;
//! [`ListingTransaction`] is the unit of work every mutation runs in.
//! Business rules (room diffing, moderation legality) live in the
//! [`reconciler`](crate::reconciler) and [`moderation`](crate::moderation)
//! modules and are written once against these traits.

use crate::error::Result;
use crate::search::{CompiledSearch, SearchHit};
use crate::state::{
    AuditAction, AuditRecord, AuditRecordId, ImagePayload, Listing, ListingAggregate, ListingId,
    ListingPayload, ListingStatus, Page, PageRequest, RoomId, RoomPayload, UserId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Filters for merchant and admin listing lists.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListQuery {
    /// Restrict to one owner (merchant lists); `None` lists everything.
    pub owner: Option<UserId>,
    /// Exact hotel type.
    pub hotel_type: Option<String>,
    /// Exact moderation status.
    pub status: Option<ListingStatus>,
    /// Case-insensitive name substring.
    pub name: Option<String>,
    /// Requested page.
    pub page: Option<PageRequest>,
}

impl ListQuery {
    /// `true` when no filter is set and the first page is requested.
    ///
    /// Only this view is cached, which keeps the set of list cache keys
    /// enumerable per owner.
    #[must_use]
    pub fn is_default_view(&self, default_page_size: u32) -> bool {
        self.hotel_type.is_none()
            && self.status.is_none()
            && self.name.as_deref().is_none_or(str::is_empty)
            && self
                .page
                .is_none_or(|p| p.page <= 1 && (p.page_size == 0 || p.page_size == default_page_size))
    }
}

/// A listing with summary figures from its rooms, used by list views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingOverview {
    /// The listing row.
    pub listing: Listing,
    /// Owner display name.
    pub owner_name: String,
    /// Number of non-deleted rooms.
    pub room_count: u32,
    /// Sum of non-deleted rooms' stock.
    pub total_stock: u64,
    /// Cheapest non-deleted room price.
    pub min_price: Option<Decimal>,
    /// URL of the primary image.
    pub primary_image: Option<String>,
}

/// Audit record about to be appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAuditRecord {
    /// Listing whose status changed.
    pub listing_id: ListingId,
    /// Acting principal.
    pub actor_id: UserId,
    /// Transition performed.
    pub action: AuditAction,
    /// Free-text reason.
    pub reason: Option<String>,
}

/// Read access to listings and the entry point for transactions.
pub trait ListingStore: Clone + Send + Sync + 'static {
    /// Transaction type opened by [`begin`](Self::begin).
    type Tx: ListingTransaction;

    /// Begin a transaction.
    ///
    /// # Errors
    ///
    /// Returns error if a connection cannot be obtained.
    fn begin(&self) -> impl std::future::Future<Output = Result<Self::Tx>> + Send;

    /// Load a non-deleted listing with its non-deleted rooms and images.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn load_listing(
        &self,
        id: ListingId,
    ) -> impl std::future::Future<Output = Result<Option<ListingAggregate>>> + Send;

    /// List non-deleted listings matching `query`, newest first.
    ///
    /// `page` is the normalized request; `query.page` is not consulted.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn list_listings(
        &self,
        query: &ListQuery,
        page: PageRequest,
    ) -> impl std::future::Future<Output = Result<Page<ListingOverview>>> + Send;

    /// Execute a compiled search.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn search(
        &self,
        search: &CompiledSearch,
    ) -> impl std::future::Future<Output = Result<Page<SearchHit>>> + Send;

    /// Approved, non-deleted, featured listings, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn featured_listings(
        &self,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<ListingOverview>>> + Send;

    /// Count non-deleted listings per status, optionally for one owner.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn status_counts(
        &self,
        owner: Option<UserId>,
    ) -> impl std::future::Future<Output = Result<Vec<(ListingStatus, u64)>>> + Send;

    /// Count non-deleted listings per region, optionally for one owner.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn region_counts(
        &self,
        owner: Option<UserId>,
    ) -> impl std::future::Future<Output = Result<Vec<(String, u64)>>> + Send;

    /// Audit records of a listing, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn audit_history(
        &self,
        listing_id: ListingId,
    ) -> impl std::future::Future<Output = Result<Vec<AuditRecord>>> + Send;
}

/// A single ACID unit of work.
///
/// Dropping a transaction without calling [`commit`](Self::commit) rolls it
/// back.
pub trait ListingTransaction: Send {
    /// Read a non-deleted listing and lock its row until the transaction ends.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn lock_listing(
        &mut self,
        id: ListingId,
    ) -> impl std::future::Future<Output = Result<Option<Listing>>> + Send;

    /// Insert a listing in `pending` status.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails.
    fn insert_listing(
        &mut self,
        owner: UserId,
        payload: &ListingPayload,
    ) -> impl std::future::Future<Output = Result<ListingId>> + Send;

    /// Overwrite a listing's content fields. Status fields are untouched.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    fn update_listing_content(
        &mut self,
        id: ListingId,
        payload: &ListingPayload,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Set status and rejection reason together.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    fn set_status(
        &mut self,
        id: ListingId,
        status: ListingStatus,
        rejection_reason: Option<String>,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Ids of the listing's non-deleted rooms.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn room_ids(
        &mut self,
        listing_id: ListingId,
    ) -> impl std::future::Future<Output = Result<Vec<RoomId>>> + Send;

    /// Insert a room under a listing.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails.
    fn insert_room(
        &mut self,
        listing_id: ListingId,
        room: &RoomPayload,
    ) -> impl std::future::Future<Output = Result<RoomId>> + Send;

    /// Update a room's content in place.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    fn update_room(
        &mut self,
        listing_id: ListingId,
        room_id: RoomId,
        room: &RoomPayload,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Soft-delete rooms of a listing.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    fn soft_delete_rooms(
        &mut self,
        listing_id: ListingId,
        room_ids: &[RoomId],
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Remove all images of a listing and insert `images` in order; the first
    /// becomes primary.
    ///
    /// # Errors
    ///
    /// Returns error if a statement fails.
    fn replace_images(
        &mut self,
        listing_id: ListingId,
        images: &[ImagePayload],
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Append an immutable audit record.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails.
    fn append_audit_record(
        &mut self,
        record: NewAuditRecord,
    ) -> impl std::future::Future<Output = Result<AuditRecordId>> + Send;

    /// Set the stock of one non-deleted room of `listing_id`.
    ///
    /// # Returns
    ///
    /// `false` if no such room belongs to the listing.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    fn update_room_stock(
        &mut self,
        listing_id: ListingId,
        room_id: RoomId,
        stock: u32,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Commit all changes.
    ///
    /// # Errors
    ///
    /// Returns error if the commit fails; nothing is applied in that case.
    fn commit(self) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Discard all changes.
    ///
    /// # Errors
    ///
    /// Returns error if the rollback statement fails.
    fn rollback(self) -> impl std::future::Future<Output = Result<()>> + Send;
}
