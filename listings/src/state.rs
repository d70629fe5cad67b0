//! Listing domain types.
//!
//! Entities mirror the relational tables (listings, rooms, images, audit
//! records); payload types are what merchants submit. All types are `Clone`
//! and serde-serializable so they can travel through the cache.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ═══════════════════════════════════════════════════════════════════════
// ID Types
// ═══════════════════════════════════════════════════════════════════════

/// Identifier of a hotel listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ListingId(pub i64);

/// Identifier of a room offering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoomId(pub i64);

/// Identifier of a listing image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ImageId(pub i64);

/// Identifier of an audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AuditRecordId(pub i64);

/// Identifier of a user (merchant or admin).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

macro_rules! display_id {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        })*
    };
}

display_id!(ListingId, RoomId, ImageId, AuditRecordId, UserId);

// ═══════════════════════════════════════════════════════════════════════
// Principals
// ═══════════════════════════════════════════════════════════════════════

/// Role of an authenticated principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Hotel owner managing their own listings.
    Merchant,
    /// Platform moderator.
    Admin,
}

impl Role {
    /// Database/string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Merchant => "merchant",
            Self::Admin => "admin",
        }
    }
}

/// Authenticated principal attached to every mutating call.
///
/// Authentication itself happens upstream; this type is trusted as given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    /// User identifier.
    pub id: UserId,
    /// User role.
    pub role: Role,
}

impl Principal {
    /// Merchant principal.
    #[must_use]
    pub const fn merchant(id: i64) -> Self {
        Self {
            id: UserId(id),
            role: Role::Merchant,
        }
    }

    /// Admin principal.
    #[must_use]
    pub const fn admin(id: i64) -> Self {
        Self {
            id: UserId(id),
            role: Role::Admin,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Moderation
// ═══════════════════════════════════════════════════════════════════════

/// Moderation status of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    /// Awaiting moderation (initial state, and after every content edit).
    Pending,
    /// Published and discoverable.
    Approved,
    /// Rejected by a moderator; carries a reason.
    Rejected,
    /// Previously approved, temporarily withdrawn.
    Offline,
}

impl ListingStatus {
    /// Database/string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Offline => "offline",
        }
    }

    /// All statuses, in display order.
    pub const ALL: [Self; 4] = [Self::Pending, Self::Approved, Self::Rejected, Self::Offline];
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "offline" => Ok(Self::Offline),
            other => Err(format!("unknown listing status: {other}")),
        }
    }
}

/// Action recorded in an audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    /// `pending -> approved`
    Approve,
    /// `pending -> rejected`
    Reject,
    /// `approved -> offline`
    Offline,
    /// `offline -> approved`
    Online,
}

impl AuditAction {
    /// Database/string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Offline => "offline",
            Self::Online => "online",
        }
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "approve" => Ok(Self::Approve),
            "reject" => Ok(Self::Reject),
            "offline" => Ok(Self::Offline),
            "online" => Ok(Self::Online),
            other => Err(format!("unknown audit action: {other}")),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Entities
// ═══════════════════════════════════════════════════════════════════════

/// A hotel record owned by a merchant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    /// Listing identifier.
    pub id: ListingId,
    /// Owning merchant.
    pub owner_id: UserId,
    /// Display name.
    pub name: String,
    /// Hotel category (e.g. "resort", "business").
    pub hotel_type: String,
    /// Administrative region (province/city) used for grouping.
    pub region: String,
    /// Street address.
    pub address: String,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Star rating, 1 to 5.
    pub star_rating: u8,
    /// Free-form facility tags.
    pub facilities: Vec<String>,
    /// Optional description.
    pub description: Option<String>,
    /// Moderation status.
    pub status: ListingStatus,
    /// Set iff `status == Rejected`.
    pub rejection_reason: Option<String>,
    /// Shown in homepage banners when approved.
    pub is_featured: bool,
    /// Soft-delete marker.
    pub is_deleted: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

/// A bookable room type belonging to exactly one listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomOffering {
    /// Room identifier.
    pub id: RoomId,
    /// Parent listing.
    pub listing_id: ListingId,
    /// Room type name.
    pub name: String,
    /// Number of beds.
    pub bed_count: u8,
    /// Bed size label (e.g. "1.8m").
    pub bed_size: String,
    /// Floor area in square metres.
    pub area_sqm: f64,
    /// Maximum guests.
    pub max_occupancy: u8,
    /// Lowest floor this room type is on.
    pub floor_min: i16,
    /// Highest floor this room type is on.
    pub floor_max: i16,
    /// Room picture.
    pub image_url: Option<String>,
    /// Inventory count.
    pub total_stock: u32,
    /// Current nightly price.
    pub price: Decimal,
    /// Whether the room is offered to guests.
    pub is_active: bool,
    /// Soft-delete marker.
    pub is_deleted: bool,
}

/// A picture of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingImage {
    /// Image identifier.
    pub id: ImageId,
    /// Parent listing.
    pub listing_id: ListingId,
    /// Stored file location.
    pub url: String,
    /// Insertion order, starting at 0.
    pub position: u32,
    /// Exactly one image per listing is primary.
    pub is_primary: bool,
}

/// Immutable record of a moderation status transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Record identifier.
    pub id: AuditRecordId,
    /// Listing whose status changed.
    pub listing_id: ListingId,
    /// Acting principal.
    pub actor_id: UserId,
    /// Transition performed.
    pub action: AuditAction,
    /// Free-text reason.
    pub reason: Option<String>,
    /// When the transition was committed.
    pub created_at: DateTime<Utc>,
}

/// A listing with its non-deleted children, as loaded for projections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingAggregate {
    /// The listing row.
    pub listing: Listing,
    /// Owner display name.
    pub owner_name: String,
    /// Non-deleted rooms, ordered by id.
    pub rooms: Vec<RoomOffering>,
    /// Images in insertion order.
    pub images: Vec<ListingImage>,
}

// ═══════════════════════════════════════════════════════════════════════
// Payloads
// ═══════════════════════════════════════════════════════════════════════

/// Listing content submitted by a merchant (create when `id` is `None`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingPayload {
    /// Existing listing to update, if any.
    pub id: Option<ListingId>,
    /// Display name.
    pub name: String,
    /// Hotel category.
    pub hotel_type: String,
    /// Administrative region.
    pub region: String,
    /// Street address.
    pub address: String,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Star rating, 1 to 5.
    pub star_rating: u8,
    /// Facility tags.
    #[serde(default)]
    pub facilities: Vec<String>,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Homepage banner flag.
    #[serde(default)]
    pub is_featured: bool,
    /// Full desired room set.
    #[serde(default)]
    pub rooms: Vec<RoomPayload>,
    /// Full desired image list; the first one becomes primary.
    #[serde(default)]
    pub images: Vec<ImagePayload>,
}

impl ListingPayload {
    /// Facility tags as stored: see [`normalize_tags`].
    #[must_use]
    pub fn facility_tags(&self) -> Vec<String> {
        normalize_tags(&self.facilities)
    }
}

/// Trim, drop blanks, sort and dedupe facility tags.
///
/// ```
/// use hotel_listings::state::normalize_tags;
///
/// let tags = vec![" wifi".to_string(), "pool".to_string(), "wifi ".to_string()];
/// assert_eq!(normalize_tags(&tags), vec!["pool", "wifi"]);
/// ```
#[must_use]
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = tags
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    normalized.sort_unstable();
    normalized.dedup();
    normalized
}

/// Room content submitted with a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomPayload {
    /// Existing room to update, if any.
    pub id: Option<RoomId>,
    /// Room type name.
    pub name: String,
    /// Number of beds.
    pub bed_count: u8,
    /// Bed size label.
    pub bed_size: String,
    /// Floor area in square metres.
    pub area_sqm: f64,
    /// Maximum guests.
    pub max_occupancy: u8,
    /// Lowest floor.
    pub floor_min: i16,
    /// Highest floor.
    pub floor_max: i16,
    /// Room picture.
    #[serde(default)]
    pub image_url: Option<String>,
    /// Inventory count.
    pub total_stock: u32,
    /// Nightly price.
    pub price: Decimal,
    /// Offered to guests.
    #[serde(default = "default_true")]
    pub is_active: bool,
}

const fn default_true() -> bool {
    true
}

/// Image reference submitted with a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePayload {
    /// Stored file location.
    pub url: String,
}

/// One entry of a stock-only update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockUpdate {
    /// Room to update.
    pub room_id: RoomId,
    /// New inventory count.
    pub new_stock: u32,
}

// ═══════════════════════════════════════════════════════════════════════
// Paging
// ═══════════════════════════════════════════════════════════════════════

/// Requested page (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Page number, starting at 1.
    pub page: u32,
    /// Items per page.
    pub page_size: u32,
}

impl PageRequest {
    /// Create a page request.
    #[must_use]
    pub const fn new(page: u32, page_size: u32) -> Self {
        Self { page, page_size }
    }

    /// Clamp to `page >= 1` and `1 <= page_size <= max`, substituting the
    /// default for a zero page size.
    #[must_use]
    pub fn normalized(self, default_size: u32, max_size: u32) -> Self {
        let page_size = if self.page_size == 0 {
            default_size
        } else {
            self.page_size.min(max_size)
        };
        Self {
            page: self.page.max(1),
            page_size: page_size.max(1),
        }
    }

    /// Number of rows to skip.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        (self.page.saturating_sub(1) as u64) * self.page_size as u64
    }
}

/// A page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Total matching items.
    pub total: u64,
    /// Page number, starting at 1.
    pub page: u32,
    /// Items per page.
    pub page_size: u32,
    /// Whether further pages exist.
    pub has_more: bool,
}

impl<T> Page<T> {
    /// Build a page; `has_more = total > page * page_size`.
    #[must_use]
    pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        Self {
            items,
            total,
            page: request.page,
            page_size: request.page_size,
            has_more: total > u64::from(request.page) * u64::from(request.page_size),
        }
    }

    /// Transform the items, keeping paging metadata.
    #[must_use]
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            page_size: self.page_size,
            has_more: self.has_more,
        }
    }
}
