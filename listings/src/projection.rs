//! Read-side view models.
//!
//! One canonical [`ListingAggregate`] is projected into three explicit
//! variants, chosen by a [`Viewer`] capability rather than by which fields
//! happen to be present:
//!
//! - [`OwnerListingView`]: everything the merchant submitted plus status
//!   and rejection reason.
//! - [`AdminListingView`]: the owner view plus owner name and audit history.
//! - [`PublicListingView`]: approved listings only, active rooms only, no
//!   moderation fields.

use crate::cache::DetailScope;
use crate::error::{ListingError, Result};
use crate::providers::ListingOverview;
use crate::search::priced_rooms;
use crate::state::{
    AuditRecord, ListingAggregate, ListingId, ListingImage, ListingStatus, Principal, Role,
    RoomId, RoomOffering, UserId,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Who a listing detail is rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Viewer {
    /// The merchant with this id; only their own listings are visible.
    Owner(UserId),
    /// A moderator; every non-deleted listing is visible.
    Admin,
    /// An anonymous guest; only approved listings are visible.
    Public,
}

impl Viewer {
    /// Owner capability for a merchant principal.
    ///
    /// # Errors
    ///
    /// Returns [`ListingError::InsufficientPermissions`] for non-merchants.
    pub fn owner(principal: &Principal) -> Result<Self> {
        match principal.role {
            Role::Merchant => Ok(Self::Owner(principal.id)),
            Role::Admin => Err(ListingError::InsufficientPermissions {
                required: Role::Merchant.as_str().to_string(),
            }),
        }
    }

    /// Admin capability for an admin principal.
    ///
    /// # Errors
    ///
    /// Returns [`ListingError::InsufficientPermissions`] for non-admins.
    pub fn admin(principal: &Principal) -> Result<Self> {
        match principal.role {
            Role::Admin => Ok(Self::Admin),
            Role::Merchant => Err(ListingError::InsufficientPermissions {
                required: Role::Admin.as_str().to_string(),
            }),
        }
    }

    /// Cache scope of this viewer's detail view.
    #[must_use]
    pub const fn scope(&self) -> DetailScope {
        match self {
            Self::Owner(_) => DetailScope::Owner,
            Self::Admin => DetailScope::Admin,
            Self::Public => DetailScope::Public,
        }
    }
}

/// A room as shown in detail views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomView {
    /// Room id.
    pub id: RoomId,
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
    pub image_url: Option<String>,
    /// Inventory count.
    pub total_stock: u32,
    /// Nightly price.
    pub price: Decimal,
    /// Offered to guests.
    pub is_active: bool,
}

impl From<&RoomOffering> for RoomView {
    fn from(room: &RoomOffering) -> Self {
        Self {
            id: room.id,
            name: room.name.clone(),
            bed_count: room.bed_count,
            bed_size: room.bed_size.clone(),
            area_sqm: room.area_sqm,
            max_occupancy: room.max_occupancy,
            floor_min: room.floor_min,
            floor_max: room.floor_max,
            image_url: room.image_url.clone(),
            total_stock: room.total_stock,
            price: room.price,
            is_active: room.is_active,
        }
    }
}

/// An image as shown in detail views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageView {
    /// Image URL.
    pub url: String,
    /// Primary image flag.
    pub is_primary: bool,
}

impl From<&ListingImage> for ImageView {
    fn from(image: &ListingImage) -> Self {
        Self {
            url: image.url.clone(),
            is_primary: image.is_primary,
        }
    }
}

/// Detail view for the owning merchant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerListingView {
    /// Listing id.
    pub id: ListingId,
    /// Owning merchant.
    pub owner_id: UserId,
    /// Display name.
    pub name: String,
    /// Hotel category.
    pub hotel_type: String,
    /// Region.
    pub region: String,
    /// Street address.
    pub address: String,
    /// Latitude.
    pub latitude: f64,
    /// Longitude.
    pub longitude: f64,
    /// Star rating.
    pub star_rating: u8,
    /// Facility tags.
    pub facilities: Vec<String>,
    /// Description.
    pub description: Option<String>,
    /// Moderation status.
    pub status: ListingStatus,
    /// Reason of the last rejection, while rejected.
    pub rejection_reason: Option<String>,
    /// Homepage banner flag.
    pub is_featured: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
    /// All non-deleted rooms, active or not.
    pub rooms: Vec<RoomView>,
    /// Images, primary first.
    pub images: Vec<ImageView>,
}

/// Detail view for moderators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminListingView {
    /// Everything the owner sees.
    pub detail: OwnerListingView,
    /// Owner display name.
    pub owner_name: String,
    /// Moderation history, newest first.
    pub audit_history: Vec<AuditRecord>,
}

/// Detail view for guests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicListingView {
    /// Listing id.
    pub id: ListingId,
    /// Display name.
    pub name: String,
    /// Hotel category.
    pub hotel_type: String,
    /// Region.
    pub region: String,
    /// Street address.
    pub address: String,
    /// Latitude.
    pub latitude: f64,
    /// Longitude.
    pub longitude: f64,
    /// Star rating.
    pub star_rating: u8,
    /// Facility tags.
    pub facilities: Vec<String>,
    /// Description.
    pub description: Option<String>,
    /// Cheapest active room.
    pub min_price: Option<Decimal>,
    /// Active rooms.
    pub rooms: Vec<RoomView>,
    /// Images, primary first.
    pub images: Vec<ImageView>,
}

/// A listing detail rendered for one [`Viewer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingView {
    /// Merchant view.
    Owner(OwnerListingView),
    /// Moderator view.
    Admin(AdminListingView),
    /// Guest view.
    Public(PublicListingView),
}

impl ListingView {
    /// Id of the listing shown.
    #[must_use]
    pub const fn listing_id(&self) -> ListingId {
        match self {
            Self::Owner(view) => view.id,
            Self::Admin(view) => view.detail.id,
            Self::Public(view) => view.id,
        }
    }

    /// `true` if `viewer` may see this rendering.
    ///
    /// Cached owner views are shared per listing, so ownership is checked
    /// again on every read.
    #[must_use]
    pub fn visible_to(&self, viewer: Viewer) -> bool {
        match (self, viewer) {
            (Self::Owner(view), Viewer::Owner(owner)) => view.owner_id == owner,
            (Self::Admin(_), Viewer::Admin) | (Self::Public(_), Viewer::Public) => true,
            _ => false,
        }
    }
}

fn images(aggregate: &ListingAggregate) -> Vec<ImageView> {
    let mut images: Vec<&ListingImage> = aggregate.images.iter().collect();
    images.sort_by_key(|image| (!image.is_primary, image.position));
    images.into_iter().map(ImageView::from).collect()
}

/// Project the owner view.
#[must_use]
pub fn owner_view(aggregate: &ListingAggregate) -> OwnerListingView {
    let listing = &aggregate.listing;
    OwnerListingView {
        id: listing.id,
        owner_id: listing.owner_id,
        name: listing.name.clone(),
        hotel_type: listing.hotel_type.clone(),
        region: listing.region.clone(),
        address: listing.address.clone(),
        latitude: listing.latitude,
        longitude: listing.longitude,
        star_rating: listing.star_rating,
        facilities: listing.facilities.clone(),
        description: listing.description.clone(),
        status: listing.status,
        rejection_reason: listing.rejection_reason.clone(),
        is_featured: listing.is_featured,
        created_at: listing.created_at,
        updated_at: listing.updated_at,
        rooms: aggregate
            .rooms
            .iter()
            .filter(|r| !r.is_deleted)
            .map(RoomView::from)
            .collect(),
        images: images(aggregate),
    }
}

/// Project the admin view.
#[must_use]
pub fn admin_view(aggregate: &ListingAggregate, audit_history: Vec<AuditRecord>) -> AdminListingView {
    AdminListingView {
        detail: owner_view(aggregate),
        owner_name: aggregate.owner_name.clone(),
        audit_history,
    }
}

/// Active rooms of an approved listing, or `None` if guests cannot see it.
#[must_use]
pub fn public_rooms(aggregate: &ListingAggregate) -> Option<Vec<RoomView>> {
    (aggregate.listing.status == ListingStatus::Approved && !aggregate.listing.is_deleted)
        .then(|| priced_rooms(&aggregate.rooms).map(RoomView::from).collect())
}

/// Project the public view, or `None` if the listing is not approved.
#[must_use]
pub fn public_view(aggregate: &ListingAggregate) -> Option<PublicListingView> {
    let rooms = public_rooms(aggregate)?;
    let listing = &aggregate.listing;

    Some(PublicListingView {
        id: listing.id,
        name: listing.name.clone(),
        hotel_type: listing.hotel_type.clone(),
        region: listing.region.clone(),
        address: listing.address.clone(),
        latitude: listing.latitude,
        longitude: listing.longitude,
        star_rating: listing.star_rating,
        facilities: listing.facilities.clone(),
        description: listing.description.clone(),
        min_price: rooms.iter().map(|r| r.price).min(),
        rooms,
        images: images(aggregate),
    })
}

/// Project `aggregate` for `viewer`.
///
/// Returns `None` when the viewer may not see the listing at all: a
/// merchant asking for someone else's listing, or a guest asking for one
/// that is not approved. Callers report both as not found.
#[must_use]
pub fn project(
    aggregate: &ListingAggregate,
    viewer: Viewer,
    audit_history: Vec<AuditRecord>,
) -> Option<ListingView> {
    match viewer {
        Viewer::Owner(owner) => (aggregate.listing.owner_id == owner)
            .then(|| ListingView::Owner(owner_view(aggregate))),
        Viewer::Admin => Some(ListingView::Admin(admin_view(aggregate, audit_history))),
        Viewer::Public => public_view(aggregate).map(ListingView::Public),
    }
}

/// One row of a merchant or admin listing list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingSummary {
    /// Listing id.
    pub id: ListingId,
    /// Display name.
    pub name: String,
    /// Hotel category.
    pub hotel_type: String,
    /// Region.
    pub region: String,
    /// Star rating.
    pub star_rating: u8,
    /// Moderation status.
    pub status: ListingStatus,
    /// Reason of the last rejection, while rejected.
    pub rejection_reason: Option<String>,
    /// Homepage banner flag.
    pub is_featured: bool,
    /// Non-deleted rooms.
    pub room_count: u32,
    /// Summed stock of non-deleted rooms.
    pub total_stock: u64,
    /// Cheapest non-deleted room.
    pub min_price: Option<Decimal>,
    /// Primary image URL.
    pub primary_image: Option<String>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
    /// Owner display name; admin lists only.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub owner_name: Option<String>,
}

impl ListingSummary {
    /// Summary for a merchant's own list.
    #[must_use]
    pub fn for_merchant(overview: ListingOverview) -> Self {
        Self::build(overview, false)
    }

    /// Summary for the admin list, including the owner name.
    #[must_use]
    pub fn for_admin(overview: ListingOverview) -> Self {
        Self::build(overview, true)
    }

    fn build(overview: ListingOverview, with_owner: bool) -> Self {
        let ListingOverview {
            listing,
            owner_name,
            room_count,
            total_stock,
            min_price,
            primary_image,
        } = overview;

        Self {
            id: listing.id,
            name: listing.name,
            hotel_type: listing.hotel_type,
            region: listing.region,
            star_rating: listing.star_rating,
            status: listing.status,
            rejection_reason: listing.rejection_reason,
            is_featured: listing.is_featured,
            room_count,
            total_stock,
            min_price,
            primary_image,
            updated_at: listing.updated_at,
            owner_name: with_owner.then_some(owner_name),
        }
    }
}

/// A homepage banner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Banner {
    /// Listing id.
    pub id: ListingId,
    /// Display name.
    pub name: String,
    /// Region.
    pub region: String,
    /// Star rating.
    pub star_rating: u8,
    /// Primary image URL.
    pub image_url: Option<String>,
    /// Cheapest room.
    pub min_price: Option<Decimal>,
}

impl From<ListingOverview> for Banner {
    fn from(overview: ListingOverview) -> Self {
        Self {
            id: overview.listing.id,
            name: overview.listing.name,
            region: overview.listing.region,
            star_rating: overview.listing.star_rating,
            image_url: overview.primary_image,
            min_price: overview.min_price,
        }
    }
}

/// Count of listings in one status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCount {
    /// Status.
    pub status: ListingStatus,
    /// Listings in it.
    pub count: u64,
}

/// Count of listings in one region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionCount {
    /// Region.
    pub region: String,
    /// Listings in it.
    pub count: u64,
}

/// Aggregates for the visualization screens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsView {
    /// Non-deleted listings counted.
    pub total: u64,
    /// One entry per status, zero-filled, in lifecycle order.
    pub by_status: Vec<StatusCount>,
    /// Regions by descending count, then name.
    pub by_region: Vec<RegionCount>,
}

/// Assemble [`StatsView`] from raw grouped counts.
#[must_use]
pub fn stats_view(status_counts: &[(ListingStatus, u64)], region_counts: Vec<(String, u64)>) -> StatsView {
    let by_status: Vec<StatusCount> = ListingStatus::ALL
        .into_iter()
        .map(|status| StatusCount {
            status,
            count: status_counts
                .iter()
                .filter(|(s, _)| *s == status)
                .map(|(_, c)| *c)
                .sum(),
        })
        .collect();

    let mut by_region: Vec<RegionCount> = region_counts
        .into_iter()
        .map(|(region, count)| RegionCount { region, count })
        .collect();
    by_region.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.region.cmp(&b.region)));

    StatsView {
        total: by_status.iter().map(|s| s.count).sum(),
        by_status,
        by_region,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{AuditAction, AuditRecordId, ImageId, Listing};

    fn aggregate(status: ListingStatus) -> ListingAggregate {
        let now = Utc::now();
        let room = |id: i64, price: i64, active: bool| RoomOffering {
            id: RoomId(id),
            listing_id: ListingId(1),
            name: format!("room {id}"),
            bed_count: 1,
            bed_size: "1.8m".to_string(),
            area_sqm: 25.0,
            max_occupancy: 2,
            floor_min: 2,
            floor_max: 8,
            image_url: None,
            total_stock: 3,
            price: Decimal::new(price, 0),
            is_active: active,
            is_deleted: false,
        };

        ListingAggregate {
            listing: Listing {
                id: ListingId(1),
                owner_id: UserId(10),
                name: "Lakeside".to_string(),
                hotel_type: "resort".to_string(),
                region: "Hangzhou".to_string(),
                address: "1 West Lake Rd".to_string(),
                latitude: 30.25,
                longitude: 120.15,
                star_rating: 5,
                facilities: vec!["spa".to_string()],
                description: None,
                status,
                rejection_reason: (status == ListingStatus::Rejected).then(|| "dup".to_string()),
                is_featured: true,
                is_deleted: false,
                created_at: now,
                updated_at: now,
            },
            owner_name: "alice".to_string(),
            rooms: vec![room(1, 800, true), room(2, 500, false), room(3, 650, true)],
            images: vec![
                ListingImage {
                    id: ImageId(2),
                    listing_id: ListingId(1),
                    url: "/b.jpg".to_string(),
                    position: 1,
                    is_primary: false,
                },
                ListingImage {
                    id: ImageId(1),
                    listing_id: ListingId(1),
                    url: "/a.jpg".to_string(),
                    position: 0,
                    is_primary: true,
                },
            ],
        }
    }

    #[test]
    fn test_public_view_hides_unapproved() {
        for status in [ListingStatus::Pending, ListingStatus::Rejected, ListingStatus::Offline] {
            assert!(public_view(&aggregate(status)).is_none());
        }
    }

    #[test]
    fn test_public_view_shows_active_rooms_only() {
        let view = public_view(&aggregate(ListingStatus::Approved)).unwrap();
        let ids: Vec<RoomId> = view.rooms.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![RoomId(1), RoomId(3)]);
        assert_eq!(view.min_price, Some(Decimal::new(650, 0)));
        assert_eq!(view.images[0].url, "/a.jpg");
    }

    #[test]
    fn test_owner_projection_requires_ownership() {
        let agg = aggregate(ListingStatus::Rejected);
        assert!(project(&agg, Viewer::Owner(UserId(99)), vec![]).is_none());

        let Some(ListingView::Owner(view)) = project(&agg, Viewer::Owner(UserId(10)), vec![]) else {
            panic!("expected owner view");
        };
        assert_eq!(view.rooms.len(), 3);
        assert_eq!(view.rejection_reason.as_deref(), Some("dup"));
    }

    #[test]
    fn test_admin_projection_carries_history() {
        let record = AuditRecord {
            id: AuditRecordId(1),
            listing_id: ListingId(1),
            actor_id: UserId(1),
            action: AuditAction::Approve,
            reason: None,
            created_at: Utc::now(),
        };
        let view = project(&aggregate(ListingStatus::Approved), Viewer::Admin, vec![record]).unwrap();

        assert!(view.visible_to(Viewer::Admin));
        assert!(!view.visible_to(Viewer::Public));
        let ListingView::Admin(admin) = view else {
            panic!("expected admin view");
        };
        assert_eq!(admin.owner_name, "alice");
        assert_eq!(admin.audit_history.len(), 1);
    }

    #[test]
    fn test_viewer_role_gating() {
        assert!(Viewer::owner(&Principal::admin(1)).is_err());
        assert!(Viewer::admin(&Principal::merchant(1)).is_err());
        assert_eq!(Viewer::owner(&Principal::merchant(4)).unwrap(), Viewer::Owner(UserId(4)));
    }

    #[test]
    fn test_stats_view_zero_fills_and_orders_regions() {
        let stats = stats_view(
            &[(ListingStatus::Approved, 3), (ListingStatus::Pending, 1)],
            vec![("Beijing".to_string(), 1), ("Shanghai".to_string(), 3), ("Anhui".to_string(), 1)],
        );

        assert_eq!(stats.total, 4);
        assert_eq!(stats.by_status.len(), 4);
        assert_eq!(stats.by_status[2].status, ListingStatus::Rejected);
        assert_eq!(stats.by_status[2].count, 0);
        let regions: Vec<&str> = stats.by_region.iter().map(|r| r.region.as_str()).collect();
        assert_eq!(regions, vec!["Shanghai", "Anhui", "Beijing"]);
    }
}
