//! `PostgreSQL` unit of work.

use super::{LISTING_COLUMNS, listing_from_row};
use crate::error::{ListingError, Result};
use crate::providers::{ListingTransaction, NewAuditRecord};
use crate::state::{
    AuditRecordId, ImagePayload, Listing, ListingId, ListingPayload, ListingStatus, RoomId,
    RoomPayload, UserId,
};
use sqlx::{Postgres, QueryBuilder, Transaction};

/// A `PostgreSQL` transaction.
///
/// Dropping it without [`commit`](ListingTransaction::commit) rolls back.
pub struct PostgresListingTransaction {
    tx: Transaction<'static, Postgres>,
}

impl PostgresListingTransaction {
    pub(super) const fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self { tx }
    }
}

fn stock(value: u32) -> Result<i32> {
    i32::try_from(value).map_err(|_| ListingError::validation("total_stock", "is too large"))
}

impl ListingTransaction for PostgresListingTransaction {
    async fn lock_listing(&mut self, id: ListingId) -> Result<Option<Listing>> {
        let sql = format!(
            "SELECT {LISTING_COLUMNS} FROM listings l \
             WHERE l.id = $1 AND NOT l.is_deleted FOR UPDATE"
        );
        let row = sqlx::query(&sql)
            .bind(id.0)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(listing_from_row).transpose()
    }

    async fn insert_listing(&mut self, owner: UserId, payload: &ListingPayload) -> Result<ListingId> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO listings \
               (owner_id, name, hotel_type, region, address, latitude, longitude, \
                star_rating, facilities, description, is_featured, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 'pending') \
             RETURNING id",
        )
        .bind(owner.0)
        .bind(&payload.name)
        .bind(&payload.hotel_type)
        .bind(&payload.region)
        .bind(&payload.address)
        .bind(payload.latitude)
        .bind(payload.longitude)
        .bind(i16::from(payload.star_rating))
        .bind(payload.facility_tags())
        .bind(&payload.description)
        .bind(payload.is_featured)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(ListingId(id))
    }

    async fn update_listing_content(&mut self, id: ListingId, payload: &ListingPayload) -> Result<()> {
        let result = sqlx::query(
            "UPDATE listings SET \
               name = $2, hotel_type = $3, region = $4, address = $5, latitude = $6, \
               longitude = $7, star_rating = $8, facilities = $9, description = $10, \
               is_featured = $11, updated_at = now() \
             WHERE id = $1 AND NOT is_deleted",
        )
        .bind(id.0)
        .bind(&payload.name)
        .bind(&payload.hotel_type)
        .bind(&payload.region)
        .bind(&payload.address)
        .bind(payload.latitude)
        .bind(payload.longitude)
        .bind(i16::from(payload.star_rating))
        .bind(payload.facility_tags())
        .bind(&payload.description)
        .bind(payload.is_featured)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ListingError::NotFound);
        }
        Ok(())
    }

    async fn set_status(
        &mut self,
        id: ListingId,
        status: ListingStatus,
        rejection_reason: Option<String>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE listings SET status = $2, rejection_reason = $3, updated_at = now() \
             WHERE id = $1",
        )
        .bind(id.0)
        .bind(status.as_str())
        .bind(rejection_reason)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ListingError::NotFound);
        }
        Ok(())
    }

    async fn room_ids(&mut self, listing_id: ListingId) -> Result<Vec<RoomId>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT id FROM room_offerings WHERE listing_id = $1 AND NOT is_deleted ORDER BY id",
        )
        .bind(listing_id.0)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(ids.into_iter().map(RoomId).collect())
    }

    async fn insert_room(&mut self, listing_id: ListingId, room: &RoomPayload) -> Result<RoomId> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO room_offerings \
               (listing_id, name, bed_count, bed_size, area_sqm, max_occupancy, floor_min, \
                floor_max, image_url, total_stock, price, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING id",
        )
        .bind(listing_id.0)
        .bind(&room.name)
        .bind(i16::from(room.bed_count))
        .bind(&room.bed_size)
        .bind(room.area_sqm)
        .bind(i16::from(room.max_occupancy))
        .bind(room.floor_min)
        .bind(room.floor_max)
        .bind(&room.image_url)
        .bind(stock(room.total_stock)?)
        .bind(room.price)
        .bind(room.is_active)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(RoomId(id))
    }

    async fn update_room(&mut self, listing_id: ListingId, room_id: RoomId, room: &RoomPayload) -> Result<()> {
        let result = sqlx::query(
            "UPDATE room_offerings SET \
               name = $3, bed_count = $4, bed_size = $5, area_sqm = $6, max_occupancy = $7, \
               floor_min = $8, floor_max = $9, image_url = $10, total_stock = $11, price = $12, \
               is_active = $13, updated_at = now() \
             WHERE id = $1 AND listing_id = $2 AND NOT is_deleted",
        )
        .bind(room_id.0)
        .bind(listing_id.0)
        .bind(&room.name)
        .bind(i16::from(room.bed_count))
        .bind(&room.bed_size)
        .bind(room.area_sqm)
        .bind(i16::from(room.max_occupancy))
        .bind(room.floor_min)
        .bind(room.floor_max)
        .bind(&room.image_url)
        .bind(stock(room.total_stock)?)
        .bind(room.price)
        .bind(room.is_active)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ListingError::NotFound);
        }
        Ok(())
    }

    async fn soft_delete_rooms(&mut self, listing_id: ListingId, room_ids: &[RoomId]) -> Result<()> {
        let ids: Vec<i64> = room_ids.iter().map(|id| id.0).collect();
        sqlx::query(
            "UPDATE room_offerings SET is_deleted = TRUE, updated_at = now() \
             WHERE listing_id = $1 AND id = ANY($2)",
        )
        .bind(listing_id.0)
        .bind(ids)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn replace_images(&mut self, listing_id: ListingId, images: &[ImagePayload]) -> Result<()> {
        sqlx::query("DELETE FROM listing_images WHERE listing_id = $1")
            .bind(listing_id.0)
            .execute(&mut *self.tx)
            .await?;

        if images.is_empty() {
            return Ok(());
        }

        let mut insert =
            QueryBuilder::<Postgres>::new("INSERT INTO listing_images (listing_id, url, position, is_primary) ");
        insert.push_values(images.iter().enumerate(), |mut row, (position, image)| {
            row.push_bind(listing_id.0)
                .push_bind(image.url.clone())
                .push_bind(i32::try_from(position).unwrap_or(i32::MAX))
                .push_bind(position == 0);
        });
        insert.build().execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn append_audit_record(&mut self, record: NewAuditRecord) -> Result<AuditRecordId> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO audit_records (listing_id, actor_id, action, reason) \
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(record.listing_id.0)
        .bind(record.actor_id.0)
        .bind(record.action.as_str())
        .bind(record.reason)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(AuditRecordId(id))
    }

    async fn update_room_stock(&mut self, listing_id: ListingId, room_id: RoomId, new_stock: u32) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE room_offerings SET total_stock = $3, updated_at = now() \
             WHERE id = $2 AND listing_id = $1 AND NOT is_deleted",
        )
        .bind(listing_id.0)
        .bind(room_id.0)
        .bind(stock(new_stock)?)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
