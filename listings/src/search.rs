//! Search compiler.
//!
//! Turns loosely-typed [`SearchFilters`] into a [`CompiledSearch`]: a list
//! of [`Predicate`]s combined with logical AND, an ordering and a page.
//! Storage backends render the predicates (the `PostgreSQL` store into SQL,
//! the in-memory store by calling [`Predicate::matches`]), so both agree on
//! semantics.
//!
//! Search only ever returns approved, non-deleted listings. The
//! distance predicate is evaluated per row with the haversine formula
//! (no bounding-box pre-filter), which is linear in the filtered set.

use crate::constants::EARTH_RADIUS_KM;
use crate::error::{ListingError, Result};
use crate::state::{Listing, ListingId, ListingStatus, PageRequest, RoomOffering, normalize_tags};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A point on Earth, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

/// Distance band around a center point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoFilter {
    /// Center point.
    pub center: GeoPoint,
    /// Minimum distance in km (inclusive).
    #[serde(default)]
    pub min_km: f64,
    /// Maximum distance in km (inclusive).
    pub max_km: f64,
}

/// Room price band; open on a side when that bound is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PriceRange {
    /// Lowest acceptable price (inclusive).
    pub min: Option<Decimal>,
    /// Highest acceptable price (inclusive).
    pub max: Option<Decimal>,
}

impl PriceRange {
    /// `true` if `price` lies in the band.
    #[must_use]
    pub fn contains(&self, price: Decimal) -> bool {
        self.min.is_none_or(|min| price >= min) && self.max.is_none_or(|max| price <= max)
    }
}

/// Public search filters as submitted by a guest.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Case-insensitive substring of the hotel name.
    pub hotel_name: Option<String>,
    /// Case-insensitive substring of the region or address.
    pub location: Option<String>,
    /// Exact hotel type.
    pub hotel_type: Option<String>,
    /// Exact star rating.
    pub star_rating: Option<u8>,
    /// Distance band.
    pub geo: Option<GeoFilter>,
    /// At least one room priced in this band.
    pub price: Option<PriceRange>,
    /// Every tag must be offered.
    #[serde(default)]
    pub facilities: Vec<String>,
    /// `"price"` or `"rating"`; anything else sorts by id.
    pub sort_by: Option<String>,
    /// `"asc"` for ascending; anything else is descending.
    pub sort_order: Option<String>,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Smallest first.
    Asc,
    /// Largest first.
    Desc,
}

/// Result ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchOrder {
    /// Ascending listing id (stable default).
    Id,
    /// Cheapest active room price; listings without rooms sort last.
    MinPrice(Direction),
    /// Star rating.
    StarRating(Direction),
}

impl SearchOrder {
    /// Resolve the guest's sort parameters.
    #[must_use]
    pub fn parse(sort_by: Option<&str>, sort_order: Option<&str>) -> Self {
        let direction = if sort_order.is_some_and(|o| o.eq_ignore_ascii_case("asc")) {
            Direction::Asc
        } else {
            Direction::Desc
        };

        match sort_by.map(str::to_ascii_lowercase).as_deref() {
            Some("price" | "min_price") => Self::MinPrice(direction),
            Some("rating" | "star" | "star_rating") => Self::StarRating(direction),
            _ => Self::Id,
        }
    }

    /// Compare two hits; ties (and the default) fall back to ascending id.
    #[must_use]
    pub fn compare(&self, a: &SearchHit, b: &SearchHit) -> Ordering {
        let primary = match self {
            Self::Id => Ordering::Equal,
            Self::MinPrice(direction) => match (a.min_price, b.min_price) {
                (Some(x), Some(y)) => directed(x.cmp(&y), *direction),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
            Self::StarRating(direction) => directed(a.star_rating.cmp(&b.star_rating), *direction),
        };
        primary.then(a.id.cmp(&b.id))
    }
}

const fn directed(ordering: Ordering, direction: Direction) -> Ordering {
    match direction {
        Direction::Asc => ordering,
        Direction::Desc => ordering.reverse(),
    }
}

/// One conjunct of a compiled search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// Listing has this status.
    StatusIs(ListingStatus),
    /// Listing is not soft-deleted.
    NotDeleted,
    /// Lowercased name contains this lowercased text.
    NameContains(String),
    /// Lowercased region or address contains this lowercased text.
    LocationContains(String),
    /// Exact hotel type.
    HotelTypeIs(String),
    /// Exact star rating.
    StarRatingIs(u8),
    /// Facility set contains this tag.
    HasFacility(String),
    /// Haversine distance from `center` is within `[min_km, max_km]`.
    DistanceWithin {
        /// Center point
        center: GeoPoint,
        /// Lower bound, km
        min_km: f64,
        /// Upper bound, km
        max_km: f64,
    },
    /// Some active, non-deleted room is priced in the band.
    HasRoomPricedWithin(PriceRange),
}

impl Predicate {
    /// Evaluate against a listing and its rooms.
    #[must_use]
    pub fn matches(&self, listing: &Listing, rooms: &[RoomOffering]) -> bool {
        match self {
            Self::StatusIs(status) => listing.status == *status,
            Self::NotDeleted => !listing.is_deleted,
            Self::NameContains(text) => listing.name.to_lowercase().contains(text),
            Self::LocationContains(text) => {
                listing.region.to_lowercase().contains(text)
                    || listing.address.to_lowercase().contains(text)
            }
            Self::HotelTypeIs(hotel_type) => listing.hotel_type == *hotel_type,
            Self::StarRatingIs(rating) => listing.star_rating == *rating,
            Self::HasFacility(tag) => listing.facilities.iter().any(|f| f == tag),
            Self::DistanceWithin {
                center,
                min_km,
                max_km,
            } => {
                let distance = haversine_km(*center, listing_point(listing));
                distance >= *min_km && distance <= *max_km
            }
            Self::HasRoomPricedWithin(range) => priced_rooms(rooms).any(|r| range.contains(r.price)),
        }
    }
}

/// A compiled, paginated search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledSearch {
    /// Conjunction of predicates; always starts with approved + not deleted.
    pub predicates: Vec<Predicate>,
    /// Center for reporting distances, if a geo filter was given.
    pub distance_from: Option<GeoPoint>,
    /// Result ordering.
    pub order: SearchOrder,
    /// Normalized page.
    pub page: PageRequest,
}

impl CompiledSearch {
    /// Evaluate all predicates against a listing and its rooms.
    #[must_use]
    pub fn matches(&self, listing: &Listing, rooms: &[RoomOffering]) -> bool {
        self.predicates.iter().all(|p| p.matches(listing, rooms))
    }

    /// `true` if a price band makes the room join mandatory.
    #[must_use]
    pub fn requires_priced_room(&self) -> bool {
        self.predicates
            .iter()
            .any(|p| matches!(p, Predicate::HasRoomPricedWithin(_)))
    }
}

/// One search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Listing id.
    pub id: ListingId,
    /// Hotel name.
    pub name: String,
    /// Hotel type.
    pub hotel_type: String,
    /// Region.
    pub region: String,
    /// Address.
    pub address: String,
    /// Star rating.
    pub star_rating: u8,
    /// Facility tags.
    pub facilities: Vec<String>,
    /// Cheapest active room price.
    pub min_price: Option<Decimal>,
    /// Primary image URL.
    pub primary_image: Option<String>,
    /// Distance from the search center, when a geo filter was given.
    pub distance_km: Option<f64>,
}

fn normalized_text(value: Option<&String>) -> Option<String> {
    value
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
}

fn check_point(field: &str, point: GeoPoint) -> Result<()> {
    if !(point.latitude.is_finite() && (-90.0..=90.0).contains(&point.latitude)) {
        return Err(ListingError::validation(
            format!("{field}.latitude"),
            "must be between -90 and 90",
        ));
    }
    if !(point.longitude.is_finite() && (-180.0..=180.0).contains(&point.longitude)) {
        return Err(ListingError::validation(
            format!("{field}.longitude"),
            "must be between -180 and 180",
        ));
    }
    Ok(())
}

/// Compile guest filters into predicates.
///
/// # Errors
///
/// Returns [`ListingError::Validation`] for out-of-range coordinates,
/// inverted bands or negative prices.
pub fn compile(filters: &SearchFilters, page: PageRequest) -> Result<CompiledSearch> {
    let mut predicates = vec![
        Predicate::StatusIs(ListingStatus::Approved),
        Predicate::NotDeleted,
    ];

    if let Some(name) = normalized_text(filters.hotel_name.as_ref()) {
        predicates.push(Predicate::NameContains(name));
    }
    if let Some(location) = normalized_text(filters.location.as_ref()) {
        predicates.push(Predicate::LocationContains(location));
    }
    if let Some(hotel_type) = filters
        .hotel_type
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        predicates.push(Predicate::HotelTypeIs(hotel_type.to_string()));
    }
    if let Some(rating) = filters.star_rating {
        if !(1..=5).contains(&rating) {
            return Err(ListingError::validation("star_rating", "must be between 1 and 5"));
        }
        predicates.push(Predicate::StarRatingIs(rating));
    }

    predicates.extend(
        normalize_tags(&filters.facilities)
            .into_iter()
            .map(Predicate::HasFacility),
    );

    let mut distance_from = None;
    if let Some(geo) = filters.geo {
        check_point("geo.center", geo.center)?;
        if !(geo.min_km.is_finite() && geo.max_km.is_finite())
            || geo.min_km < 0.0
            || geo.min_km > geo.max_km
        {
            return Err(ListingError::validation(
                "geo",
                "distance band must satisfy 0 <= min_km <= max_km",
            ));
        }
        distance_from = Some(geo.center);
        predicates.push(Predicate::DistanceWithin {
            center: geo.center,
            min_km: geo.min_km,
            max_km: geo.max_km,
        });
    }

    if let Some(range) = filters.price {
        let negative = |d: Option<Decimal>| d.is_some_and(|d| d < Decimal::ZERO);
        if negative(range.min) || negative(range.max) {
            return Err(ListingError::validation("price", "bounds must not be negative"));
        }
        if let (Some(min), Some(max)) = (range.min, range.max) {
            if min > max {
                return Err(ListingError::validation("price", "min must not exceed max"));
            }
        }
        if range.min.is_some() || range.max.is_some() {
            predicates.push(Predicate::HasRoomPricedWithin(range));
        }
    }

    Ok(CompiledSearch {
        predicates,
        distance_from,
        order: SearchOrder::parse(filters.sort_by.as_deref(), filters.sort_order.as_deref()),
        page,
    })
}

/// Great-circle distance in kilometres.
#[must_use]
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lat2) = (a.latitude.to_radians(), b.latitude.to_radians());
    let d_lat = lat2 - lat1;
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Coordinates of a listing.
#[must_use]
pub const fn listing_point(listing: &Listing) -> GeoPoint {
    GeoPoint {
        latitude: listing.latitude,
        longitude: listing.longitude,
    }
}

/// Rooms that count for price filtering and sorting.
pub fn priced_rooms(rooms: &[RoomOffering]) -> impl Iterator<Item = &RoomOffering> {
    rooms.iter().filter(|r| r.is_active && !r.is_deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{RoomId, UserId};
    use chrono::Utc;

    const PEOPLES_SQUARE: GeoPoint = GeoPoint {
        latitude: 31.2304,
        longitude: 121.4737,
    };

    fn listing(name: &str, lat: f64, lon: f64) -> Listing {
        Listing {
            id: ListingId(1),
            owner_id: UserId(1),
            name: name.to_string(),
            hotel_type: "business".to_string(),
            region: "Shanghai".to_string(),
            address: "88 Nanjing Rd".to_string(),
            latitude: lat,
            longitude: lon,
            star_rating: 4,
            facilities: vec!["wifi".to_string(), "pool".to_string()],
            description: None,
            status: ListingStatus::Approved,
            rejection_reason: None,
            is_featured: false,
            is_deleted: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn room(price: i64, active: bool) -> RoomOffering {
        RoomOffering {
            id: RoomId(1),
            listing_id: ListingId(1),
            name: "Standard".to_string(),
            bed_count: 1,
            bed_size: "1.5m".to_string(),
            area_sqm: 20.0,
            max_occupancy: 2,
            floor_min: 1,
            floor_max: 3,
            image_url: None,
            total_stock: 4,
            price: Decimal::new(price, 0),
            is_active: active,
            is_deleted: false,
        }
    }

    fn hit(id: i64, price: Option<i64>, stars: u8) -> SearchHit {
        SearchHit {
            id: ListingId(id),
            name: String::new(),
            hotel_type: String::new(),
            region: String::new(),
            address: String::new(),
            star_rating: stars,
            facilities: vec![],
            min_price: price.map(|p| Decimal::new(p, 0)),
            primary_image: None,
            distance_km: None,
        }
    }

    #[test]
    fn test_haversine_known_distance() {
        // People's Square to Pudong airport, straight line.
        let pudong = GeoPoint {
            latitude: 31.1443,
            longitude: 121.8083,
        };
        let d = haversine_km(PEOPLES_SQUARE, pudong);
        assert!((d - 33.3).abs() < 1.5, "distance was {d}");
        assert!(haversine_km(PEOPLES_SQUARE, PEOPLES_SQUARE).abs() < 1e-9);
    }

    #[test]
    fn test_base_predicates_always_present() {
        let compiled = compile(&SearchFilters::default(), PageRequest::new(1, 10)).unwrap();
        assert_eq!(
            compiled.predicates,
            vec![Predicate::StatusIs(ListingStatus::Approved), Predicate::NotDeleted]
        );

        let mut offline = listing("A", 31.0, 121.0);
        offline.status = ListingStatus::Offline;
        assert!(!compiled.matches(&offline, &[]));
    }

    #[test]
    fn test_text_filters_are_case_insensitive() {
        let filters = SearchFilters {
            hotel_name: Some("HARBOUR".to_string()),
            location: Some("nanjing".to_string()),
            ..SearchFilters::default()
        };
        let compiled = compile(&filters, PageRequest::new(1, 10)).unwrap();

        assert!(compiled.matches(&listing("The Harbour Hotel", 31.0, 121.0), &[]));
        assert!(!compiled.matches(&listing("Garden Inn", 31.0, 121.0), &[]));
    }

    #[test]
    fn test_facilities_require_every_tag() {
        let filters = SearchFilters {
            facilities: vec!["wifi".to_string(), "gym".to_string()],
            ..SearchFilters::default()
        };
        let compiled = compile(&filters, PageRequest::new(1, 10)).unwrap();
        assert!(!compiled.matches(&listing("A", 31.0, 121.0), &[]));

        let filters = SearchFilters {
            facilities: vec!["wifi".to_string(), "pool".to_string(), "wifi".to_string()],
            ..SearchFilters::default()
        };
        let compiled = compile(&filters, PageRequest::new(1, 10)).unwrap();
        assert_eq!(compiled.predicates.len(), 4);
        assert!(compiled.matches(&listing("A", 31.0, 121.0), &[]));
    }

    #[test]
    fn test_distance_band() {
        let filters = SearchFilters {
            geo: Some(GeoFilter {
                center: PEOPLES_SQUARE,
                min_km: 1.0,
                max_km: 10.0,
            }),
            ..SearchFilters::default()
        };
        let compiled = compile(&filters, PageRequest::new(1, 10)).unwrap();

        // ~0 km: inside the center exclusion.
        assert!(!compiled.matches(&listing("A", 31.2304, 121.4737), &[]));
        // ~5.5 km north.
        assert!(compiled.matches(&listing("B", 31.28, 121.4737), &[]));
        // ~111 km north.
        assert!(!compiled.matches(&listing("C", 32.2304, 121.4737), &[]));
        assert_eq!(compiled.distance_from, Some(PEOPLES_SQUARE));
    }

    #[test]
    fn test_price_band_needs_an_active_room() {
        let filters = SearchFilters {
            price: Some(PriceRange {
                min: Some(Decimal::new(200, 0)),
                max: Some(Decimal::new(400, 0)),
            }),
            ..SearchFilters::default()
        };
        let compiled = compile(&filters, PageRequest::new(1, 10)).unwrap();
        let l = listing("A", 31.0, 121.0);

        assert!(compiled.requires_priced_room());
        assert!(!compiled.matches(&l, &[]));
        assert!(!compiled.matches(&l, &[room(500, true)]));
        assert!(!compiled.matches(&l, &[room(300, false)]));
        assert!(compiled.matches(&l, &[room(500, true), room(300, true)]));
    }

    #[test]
    fn test_invalid_filters_rejected() {
        let inverted = SearchFilters {
            price: Some(PriceRange {
                min: Some(Decimal::new(5, 0)),
                max: Some(Decimal::new(1, 0)),
            }),
            ..SearchFilters::default()
        };
        assert!(compile(&inverted, PageRequest::new(1, 10)).is_err());

        let bad_geo = SearchFilters {
            geo: Some(GeoFilter {
                center: GeoPoint {
                    latitude: 91.0,
                    longitude: 0.0,
                },
                min_km: 0.0,
                max_km: 5.0,
            }),
            ..SearchFilters::default()
        };
        assert!(compile(&bad_geo, PageRequest::new(1, 10)).is_err());
    }

    #[test]
    fn test_sort_parsing() {
        assert_eq!(SearchOrder::parse(None, None), SearchOrder::Id);
        assert_eq!(SearchOrder::parse(Some("bogus"), Some("asc")), SearchOrder::Id);
        assert_eq!(
            SearchOrder::parse(Some("price"), None),
            SearchOrder::MinPrice(Direction::Desc)
        );
        assert_eq!(
            SearchOrder::parse(Some("rating"), Some("ASC")),
            SearchOrder::StarRating(Direction::Asc)
        );
    }

    #[test]
    fn test_price_order_puts_roomless_last() {
        let mut hits = vec![hit(1, None, 3), hit(2, Some(300), 3), hit(3, Some(100), 3)];

        hits.sort_by(|a, b| SearchOrder::MinPrice(Direction::Asc).compare(a, b));
        let ids: Vec<i64> = hits.iter().map(|h| h.id.0).collect();
        assert_eq!(ids, vec![3, 2, 1]);

        hits.sort_by(|a, b| SearchOrder::MinPrice(Direction::Desc).compare(a, b));
        let ids: Vec<i64> = hits.iter().map(|h| h.id.0).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn test_default_order_is_ascending_id() {
        let mut hits = vec![hit(3, None, 5), hit(1, None, 1), hit(2, None, 3)];
        hits.sort_by(|a, b| SearchOrder::Id.compare(a, b));
        let ids: Vec<i64> = hits.iter().map(|h| h.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
