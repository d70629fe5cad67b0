//! `PostgreSQL` listing store.
//!
//! Listings, rooms, images and audit records live in the tables created by
//! `migrations/`. Queries are checked at runtime (`sqlx::query` with
//! `.bind`), so building the crate does not need a live database.
//!
//! # Example
//!
//! ```no_run
//! use hotel_listings::stores::PostgresListingStore;
//! use sqlx::PgPool;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = PgPool::connect("postgresql://localhost/hotel_listings").await?;
//! let store = PostgresListingStore::new(pool);
//! store.migrate().await?;
//! # Ok(())
//! # }
//! ```

mod search;
mod transaction;

pub use transaction::PostgresListingTransaction;

use crate::config::PostgresConfig;
use crate::error::{ListingError, Result};
use crate::providers::{ListQuery, ListingOverview, ListingStore};
use crate::search::{CompiledSearch, SearchHit};
use crate::state::{
    AuditAction, AuditRecord, AuditRecordId, ImageId, Listing, ListingAggregate, ListingId,
    ListingImage, ListingStatus, Page, PageRequest, Role, RoomId, RoomOffering, UserId,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use std::time::Duration;

/// Listing columns, qualified with the `l` alias.
const LISTING_COLUMNS: &str = "l.id, l.owner_id, l.name, l.hotel_type, l.region, \
     l.address, l.latitude, l.longitude, l.star_rating, l.facilities, l.description, l.status, \
     l.rejection_reason, l.is_featured, l.is_deleted, l.created_at, l.updated_at";

const ROOM_COLUMNS: &str = "id, listing_id, name, bed_count, bed_size, area_sqm, max_occupancy, \
     floor_min, floor_max, image_url, total_stock, price, is_active, is_deleted";

/// Listing plus list-view figures computed from non-deleted rooms.
const OVERVIEW_SELECT: &str = "SELECT l.id, l.owner_id, l.name, l.hotel_type, l.region, \
     l.address, l.latitude, l.longitude, l.star_rating, l.facilities, l.description, l.status, \
     l.rejection_reason, l.is_featured, l.is_deleted, l.created_at, l.updated_at, \
     u.username AS owner_name, \
     (SELECT COUNT(*) FROM room_offerings r WHERE r.listing_id = l.id AND NOT r.is_deleted) AS room_count, \
     (SELECT COALESCE(SUM(r.total_stock), 0)::BIGINT FROM room_offerings r \
        WHERE r.listing_id = l.id AND NOT r.is_deleted) AS total_stock, \
     (SELECT MIN(r.price) FROM room_offerings r WHERE r.listing_id = l.id AND NOT r.is_deleted) AS min_price, \
     (SELECT i.url FROM listing_images i WHERE i.listing_id = l.id AND i.is_primary LIMIT 1) AS primary_image \
     FROM listings l JOIN users u ON u.id = l.owner_id";

/// `PostgreSQL` implementation of [`ListingStore`].
#[derive(Clone)]
pub struct PostgresListingStore {
    /// `PostgreSQL` connection pool.
    pool: PgPool,
}

impl PostgresListingStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool sized by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ListingError::Database`] if the connection fails.
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout))
            .idle_timeout(Duration::from_secs(config.idle_timeout))
            .connect(&config.url)
            .await
            .map_err(|e| ListingError::Database(format!("Failed to connect: {e}")))?;

        Ok(Self::new(pool))
    }

    /// Run database migrations.
    ///
    /// # Errors
    ///
    /// Returns error if migrations fail.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ListingError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert a user row. Accounts are managed upstream; this exists for
    /// seeding and tests.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails (e.g. duplicate username).
    pub async fn create_user(&self, username: &str, role: Role) -> Result<UserId> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO users (username, role) VALUES ($1, $2) RETURNING id",
        )
        .bind(username)
        .bind(role.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(UserId(id))
    }

    async fn fetch_overviews(&self, mut builder: QueryBuilder<'_, Postgres>) -> Result<Vec<ListingOverview>> {
        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(overview_from_row).collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Row decoding
// ═══════════════════════════════════════════════════════════════════════

fn decode_err(column: &str, e: impl std::fmt::Display) -> ListingError {
    ListingError::Database(format!("Invalid value in column {column}: {e}"))
}

fn small_unsigned(row: &PgRow, column: &str) -> Result<u8> {
    let value: i16 = row.try_get(column)?;
    u8::try_from(value).map_err(|e| decode_err(column, e))
}

fn unsigned(row: &PgRow, column: &str) -> Result<u32> {
    let value: i32 = row.try_get(column)?;
    u32::try_from(value).map_err(|e| decode_err(column, e))
}

fn count(row: &PgRow, column: &str) -> Result<u64> {
    let value: i64 = row.try_get(column)?;
    u64::try_from(value).map_err(|e| decode_err(column, e))
}

fn listing_from_row(row: &PgRow) -> Result<Listing> {
    let status: String = row.try_get("status")?;
    Ok(Listing {
        id: ListingId(row.try_get("id")?),
        owner_id: UserId(row.try_get("owner_id")?),
        name: row.try_get("name")?,
        hotel_type: row.try_get("hotel_type")?,
        region: row.try_get("region")?,
        address: row.try_get("address")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        star_rating: small_unsigned(row, "star_rating")?,
        facilities: row.try_get("facilities")?,
        description: row.try_get("description")?,
        status: status.parse().map_err(|e| decode_err("status", e))?,
        rejection_reason: row.try_get("rejection_reason")?,
        is_featured: row.try_get("is_featured")?,
        is_deleted: row.try_get("is_deleted")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn room_from_row(row: &PgRow) -> Result<RoomOffering> {
    Ok(RoomOffering {
        id: RoomId(row.try_get("id")?),
        listing_id: ListingId(row.try_get("listing_id")?),
        name: row.try_get("name")?,
        bed_count: small_unsigned(row, "bed_count")?,
        bed_size: row.try_get("bed_size")?,
        area_sqm: row.try_get("area_sqm")?,
        max_occupancy: small_unsigned(row, "max_occupancy")?,
        floor_min: row.try_get("floor_min")?,
        floor_max: row.try_get("floor_max")?,
        image_url: row.try_get("image_url")?,
        total_stock: unsigned(row, "total_stock")?,
        price: row.try_get("price")?,
        is_active: row.try_get("is_active")?,
        is_deleted: row.try_get("is_deleted")?,
    })
}

fn image_from_row(row: &PgRow) -> Result<ListingImage> {
    Ok(ListingImage {
        id: ImageId(row.try_get("id")?),
        listing_id: ListingId(row.try_get("listing_id")?),
        url: row.try_get("url")?,
        position: unsigned(row, "position")?,
        is_primary: row.try_get("is_primary")?,
    })
}

fn overview_from_row(row: &PgRow) -> Result<ListingOverview> {
    Ok(ListingOverview {
        listing: listing_from_row(row)?,
        owner_name: row.try_get("owner_name")?,
        room_count: u32::try_from(count(row, "room_count")?).map_err(|e| decode_err("room_count", e))?,
        total_stock: count(row, "total_stock")?,
        min_price: row.try_get("min_price")?,
        primary_image: row.try_get("primary_image")?,
    })
}

fn audit_from_row(row: &PgRow) -> Result<AuditRecord> {
    let action: String = row.try_get("action")?;
    Ok(AuditRecord {
        id: AuditRecordId(row.try_get("id")?),
        listing_id: ListingId(row.try_get("listing_id")?),
        actor_id: UserId(row.try_get("actor_id")?),
        action: action
            .parse::<AuditAction>()
            .map_err(|e| decode_err("action", e))?,
        reason: row.try_get("reason")?,
        created_at: row.try_get("created_at")?,
    })
}

fn push_list_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &ListQuery) {
    builder.push(" WHERE NOT l.is_deleted");
    if let Some(owner) = query.owner {
        builder.push(" AND l.owner_id = ").push_bind(owner.0);
    }
    if let Some(hotel_type) = &query.hotel_type {
        builder.push(" AND l.hotel_type = ").push_bind(hotel_type.clone());
    }
    if let Some(status) = query.status {
        builder.push(" AND l.status = ").push_bind(status.as_str());
    }
    if let Some(name) = query
        .name
        .as_deref()
        .map(|n| n.trim().to_lowercase())
        .filter(|n| !n.is_empty())
    {
        builder.push(" AND strpos(LOWER(l.name), ").push_bind(name).push(") > 0");
    }
}

#[allow(clippy::cast_possible_wrap)] // Page sizes are clamped far below i64::MAX
const fn limit_offset(page: PageRequest) -> (i64, i64) {
    (page.page_size as i64, page.offset() as i64)
}

impl ListingStore for PostgresListingStore {
    type Tx = PostgresListingTransaction;

    async fn begin(&self) -> Result<Self::Tx> {
        let tx = self.pool.begin().await?;
        Ok(PostgresListingTransaction::new(tx))
    }

    async fn load_listing(&self, id: ListingId) -> Result<Option<ListingAggregate>> {
        let sql = format!(
            "SELECT {LISTING_COLUMNS}, u.username AS owner_name \
             FROM listings l JOIN users u ON u.id = l.owner_id \
             WHERE l.id = $1 AND NOT l.is_deleted"
        );
        let Some(row) = sqlx::query(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let rooms = sqlx::query(&format!(
            "SELECT {ROOM_COLUMNS} FROM room_offerings \
             WHERE listing_id = $1 AND NOT is_deleted ORDER BY id"
        ))
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?;

        let images = sqlx::query(
            "SELECT id, listing_id, url, position, is_primary FROM listing_images \
             WHERE listing_id = $1 ORDER BY position",
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(ListingAggregate {
            listing: listing_from_row(&row)?,
            owner_name: row.try_get("owner_name")?,
            rooms: rooms.iter().map(room_from_row).collect::<Result<_>>()?,
            images: images.iter().map(image_from_row).collect::<Result<_>>()?,
        }))
    }

    async fn list_listings(&self, query: &ListQuery, page: PageRequest) -> Result<Page<ListingOverview>> {
        let mut count_query = QueryBuilder::new("SELECT COUNT(*) FROM listings l");
        push_list_filters(&mut count_query, query);
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let (limit, offset) = limit_offset(page);
        let mut select = QueryBuilder::new(OVERVIEW_SELECT);
        push_list_filters(&mut select, query);
        select
            .push(" ORDER BY l.created_at DESC, l.id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let items = self.fetch_overviews(select).await?;
        Ok(Page::new(
            items,
            u64::try_from(total).map_err(|e| decode_err("count", e))?,
            page,
        ))
    }

    async fn search(&self, compiled: &CompiledSearch) -> Result<Page<SearchHit>> {
        let total: i64 = search::count_query(compiled)
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let rows = search::select_query(compiled)
            .build()
            .fetch_all(&self.pool)
            .await?;
        let hits = rows
            .iter()
            .map(search::hit_from_row)
            .collect::<Result<Vec<_>>>()?;

        Ok(Page::new(
            hits,
            u64::try_from(total).map_err(|e| decode_err("count", e))?,
            compiled.page,
        ))
    }

    async fn featured_listings(&self, limit: u32) -> Result<Vec<ListingOverview>> {
        let mut select = QueryBuilder::new(OVERVIEW_SELECT);
        select
            .push(" WHERE NOT l.is_deleted AND l.is_featured AND l.status = ")
            .push_bind(ListingStatus::Approved.as_str())
            .push(" ORDER BY l.created_at DESC, l.id DESC LIMIT ")
            .push_bind(i64::from(limit));
        self.fetch_overviews(select).await
    }

    async fn status_counts(&self, owner: Option<UserId>) -> Result<Vec<(ListingStatus, u64)>> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS count FROM listings \
             WHERE NOT is_deleted AND ($1::BIGINT IS NULL OR owner_id = $1) \
             GROUP BY status",
        )
        .bind(owner.map(|o| o.0))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<(ListingStatus, u64)> {
                let status: String = row.try_get("status")?;
                Ok((
                    status.parse().map_err(|e| decode_err("status", e))?,
                    count(row, "count")?,
                ))
            })
            .collect()
    }

    async fn region_counts(&self, owner: Option<UserId>) -> Result<Vec<(String, u64)>> {
        let rows = sqlx::query(
            "SELECT region, COUNT(*) AS count FROM listings \
             WHERE NOT is_deleted AND ($1::BIGINT IS NULL OR owner_id = $1) \
             GROUP BY region",
        )
        .bind(owner.map(|o| o.0))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<(String, u64)> { Ok((row.try_get("region")?, count(row, "count")?)) })
            .collect()
    }

    async fn audit_history(&self, listing_id: ListingId) -> Result<Vec<AuditRecord>> {
        let rows = sqlx::query(
            "SELECT id, listing_id, actor_id, action, reason, created_at FROM audit_records \
             WHERE listing_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(listing_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(audit_from_row).collect()
    }
}
