//! SQL rendering of compiled searches.

use super::{limit_offset, small_unsigned};
use crate::constants::EARTH_RADIUS_KM;
use crate::error::Result;
use crate::search::{CompiledSearch, Direction, GeoPoint, Predicate, SearchHit, SearchOrder};
use crate::state::ListingId;
use sqlx::postgres::PgRow;
use sqlx::{Postgres, QueryBuilder, Row};

const MIN_ACTIVE_PRICE: &str = "(SELECT MIN(r.price) FROM room_offerings r \
     WHERE r.listing_id = l.id AND r.is_active AND NOT r.is_deleted)";

/// Haversine distance from `center` to the listing row, in km.
fn push_distance(builder: &mut QueryBuilder<'static, Postgres>, center: GeoPoint) {
    builder
        .push("(2 * ")
        .push(EARTH_RADIUS_KM)
        .push(" * ASIN(LEAST(1.0, SQRT(POWER(SIN(RADIANS(l.latitude - ")
        .push_bind(center.latitude)
        .push(") / 2), 2) + COS(RADIANS(")
        .push_bind(center.latitude)
        .push(")) * COS(RADIANS(l.latitude)) * POWER(SIN(RADIANS(l.longitude - ")
        .push_bind(center.longitude)
        .push(") / 2), 2)))))");
}

fn push_predicate(builder: &mut QueryBuilder<'static, Postgres>, predicate: &Predicate) {
    match predicate {
        Predicate::StatusIs(status) => {
            builder.push("l.status = ").push_bind(status.as_str());
        }
        Predicate::NotDeleted => {
            builder.push("NOT l.is_deleted");
        }
        Predicate::NameContains(text) => {
            builder
                .push("strpos(LOWER(l.name), ")
                .push_bind(text.clone())
                .push(") > 0");
        }
        Predicate::LocationContains(text) => {
            builder
                .push("(strpos(LOWER(l.region), ")
                .push_bind(text.clone())
                .push(") > 0 OR strpos(LOWER(l.address), ")
                .push_bind(text.clone())
                .push(") > 0)");
        }
        Predicate::HotelTypeIs(hotel_type) => {
            builder.push("l.hotel_type = ").push_bind(hotel_type.clone());
        }
        Predicate::StarRatingIs(rating) => {
            builder.push("l.star_rating = ").push_bind(i16::from(*rating));
        }
        Predicate::HasFacility(tag) => {
            builder
                .push("l.facilities @> ARRAY[")
                .push_bind(tag.clone())
                .push("]::TEXT[]");
        }
        Predicate::DistanceWithin {
            center,
            min_km,
            max_km,
        } => {
            push_distance(builder, *center);
            builder
                .push(" BETWEEN ")
                .push_bind(*min_km)
                .push(" AND ")
                .push_bind(*max_km);
        }
        Predicate::HasRoomPricedWithin(range) => {
            builder.push(
                "EXISTS (SELECT 1 FROM room_offerings r \
                 WHERE r.listing_id = l.id AND r.is_active AND NOT r.is_deleted",
            );
            if let Some(min) = range.min {
                builder.push(" AND r.price >= ").push_bind(min);
            }
            if let Some(max) = range.max {
                builder.push(" AND r.price <= ").push_bind(max);
            }
            builder.push(")");
        }
    }
}

fn push_where(builder: &mut QueryBuilder<'static, Postgres>, search: &CompiledSearch) {
    for (i, predicate) in search.predicates.iter().enumerate() {
        builder.push(if i == 0 { " WHERE " } else { " AND " });
        push_predicate(builder, predicate);
    }
}

const fn sql_direction(direction: Direction) -> &'static str {
    match direction {
        Direction::Asc => "ASC",
        Direction::Desc => "DESC",
    }
}

/// `SELECT COUNT(*)` over every matching listing.
pub(super) fn count_query(search: &CompiledSearch) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM listings l");
    push_where(&mut builder, search);
    builder
}

/// One page of hits in the requested order.
pub(super) fn select_query(search: &CompiledSearch) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(
        "SELECT l.id, l.name, l.hotel_type, l.region, l.address, l.star_rating, l.facilities, ",
    );
    builder
        .push(MIN_ACTIVE_PRICE)
        .push(
            " AS min_price, \
             (SELECT i.url FROM listing_images i WHERE i.listing_id = l.id AND i.is_primary LIMIT 1) \
             AS primary_image, ",
        );
    match search.distance_from {
        Some(center) => push_distance(&mut builder, center),
        None => {
            builder.push("NULL::DOUBLE PRECISION");
        }
    }
    builder.push(" AS distance_km FROM listings l");
    push_where(&mut builder, search);

    match search.order {
        SearchOrder::Id => {
            builder.push(" ORDER BY l.id ASC");
        }
        SearchOrder::MinPrice(direction) => {
            builder
                .push(" ORDER BY min_price ")
                .push(sql_direction(direction))
                .push(" NULLS LAST, l.id ASC");
        }
        SearchOrder::StarRating(direction) => {
            builder
                .push(" ORDER BY l.star_rating ")
                .push(sql_direction(direction))
                .push(", l.id ASC");
        }
    }

    let (limit, offset) = limit_offset(search.page);
    builder
        .push(" LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);
    builder
}

pub(super) fn hit_from_row(row: &PgRow) -> Result<SearchHit> {
    Ok(SearchHit {
        id: ListingId(row.try_get("id")?),
        name: row.try_get("name")?,
        hotel_type: row.try_get("hotel_type")?,
        region: row.try_get("region")?,
        address: row.try_get("address")?,
        star_rating: small_unsigned(row, "star_rating")?,
        facilities: row.try_get("facilities")?,
        min_price: row.try_get("min_price")?,
        primary_image: row.try_get("primary_image")?,
        distance_km: row.try_get("distance_km")?,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::search::{GeoFilter, PriceRange, SearchFilters, compile};
    use crate::state::PageRequest;
    use rust_decimal::Decimal;

    #[test]
    fn test_default_search_sql() {
        let compiled = compile(&SearchFilters::default(), PageRequest::new(1, 10)).unwrap();
        let sql = select_query(&compiled).into_sql();

        assert!(sql.contains("WHERE l.status = $1 AND NOT l.is_deleted"));
        assert!(sql.contains("NULL::DOUBLE PRECISION AS distance_km"));
        assert!(sql.ends_with("ORDER BY l.id ASC LIMIT $2 OFFSET $3"));
    }

    #[test]
    fn test_price_sort_puts_unpriced_last() {
        let filters = SearchFilters {
            sort_by: Some("price".to_string()),
            sort_order: Some("desc".to_string()),
            ..SearchFilters::default()
        };
        let compiled = compile(&filters, PageRequest::new(1, 10)).unwrap();
        let sql = select_query(&compiled).into_sql();

        assert!(sql.contains("ORDER BY min_price DESC NULLS LAST, l.id ASC"));
    }

    #[test]
    fn test_filters_render_as_conjunction() {
        let filters = SearchFilters {
            hotel_name: Some("Bund".to_string()),
            facilities: vec!["wifi".to_string()],
            geo: Some(GeoFilter {
                center: GeoPoint {
                    latitude: 31.23,
                    longitude: 121.47,
                },
                min_km: 0.0,
                max_km: 5.0,
            }),
            price: Some(PriceRange {
                min: None,
                max: Some(Decimal::new(500, 0)),
            }),
            ..SearchFilters::default()
        };
        let compiled = compile(&filters, PageRequest::new(1, 10)).unwrap();
        let count_sql = count_query(&compiled).into_sql();

        assert!(count_sql.starts_with("SELECT COUNT(*) FROM listings l WHERE "));
        assert!(count_sql.contains("strpos(LOWER(l.name), $2) > 0"));
        assert!(count_sql.contains("l.facilities @> ARRAY[$3]::TEXT[]"));
        assert!(count_sql.contains("BETWEEN"));
        assert!(count_sql.contains("AND r.price <= "));
        assert!(!count_sql.contains("r.price >= "));

        let select_sql = select_query(&compiled).into_sql();
        assert!(!select_sql.contains("NULL::DOUBLE PRECISION"));
    }
}
