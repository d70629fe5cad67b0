//! Payload validation.
//!
//! Runs before any claim is taken or any row is written. Messages are
//! surfaced to callers verbatim.

use crate::constants::{MAX_STOCK, PRICE_INTEGER_DIGITS, PRICE_SCALE};
use crate::error::{ListingError, Result};
use crate::state::{ListingPayload, RoomPayload, StockUpdate};
use rust_decimal::Decimal;
use std::collections::HashSet;

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ListingError::validation(field, "must not be empty"));
    }
    Ok(())
}

/// Validate a listing save payload, including its rooms and images.
///
/// # Errors
///
/// Returns [`ListingError::Validation`] naming the first offending field.
///
/// # Examples
///
/// ```
/// # use hotel_listings::validation::validate_listing;
/// # use hotel_listings::state::ListingPayload;
/// let payload: ListingPayload = serde_json::from_value(serde_json::json!({
///     "id": null, "name": "", "hotel_type": "resort", "region": "Hainan",
///     "address": "1 Beach Rd", "latitude": 18.2, "longitude": 109.5, "star_rating": 5
/// })).unwrap();
/// assert!(validate_listing(&payload).is_err());
/// ```
pub fn validate_listing(payload: &ListingPayload) -> Result<()> {
    require_text("name", &payload.name)?;
    require_text("hotel_type", &payload.hotel_type)?;
    require_text("region", &payload.region)?;
    require_text("address", &payload.address)?;

    if !(payload.latitude.is_finite() && (-90.0..=90.0).contains(&payload.latitude)) {
        return Err(ListingError::validation("latitude", "must be between -90 and 90"));
    }
    if !(payload.longitude.is_finite() && (-180.0..=180.0).contains(&payload.longitude)) {
        return Err(ListingError::validation("longitude", "must be between -180 and 180"));
    }
    if !(1..=5).contains(&payload.star_rating) {
        return Err(ListingError::validation("star_rating", "must be between 1 and 5"));
    }

    for (i, facility) in payload.facilities.iter().enumerate() {
        require_text(&format!("facilities[{i}]"), facility)?;
    }

    let mut seen = HashSet::new();
    for (i, room) in payload.rooms.iter().enumerate() {
        validate_room(i, room)?;
        if let Some(id) = room.id {
            if !seen.insert(id) {
                return Err(ListingError::validation(
                    format!("rooms[{i}].id"),
                    format!("room {id} appears more than once"),
                ));
            }
        }
    }

    for (i, image) in payload.images.iter().enumerate() {
        require_text(&format!("images[{i}].url"), &image.url)?;
    }

    Ok(())
}

fn check_stock(field: impl Into<String>, stock: u32) -> Result<()> {
    if stock > MAX_STOCK {
        return Err(ListingError::validation(
            field,
            format!("must not exceed {MAX_STOCK}"),
        ));
    }
    Ok(())
}

fn check_price(field: &str, price: Decimal) -> Result<()> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(ListingError::validation(field, "must not be negative"));
    }
    if price.normalize().scale() > PRICE_SCALE {
        return Err(ListingError::validation(
            field,
            format!("must have at most {PRICE_SCALE} decimal places"),
        ));
    }
    if price >= Decimal::from(10_i64.pow(PRICE_INTEGER_DIGITS)) {
        return Err(ListingError::validation(
            field,
            format!("must have at most {PRICE_INTEGER_DIGITS} integer digits"),
        ));
    }
    Ok(())
}

fn validate_room(index: usize, room: &RoomPayload) -> Result<()> {
    let field = |name: &str| format!("rooms[{index}].{name}");

    require_text(&field("name"), &room.name)?;
    require_text(&field("bed_size"), &room.bed_size)?;

    if room.bed_count == 0 {
        return Err(ListingError::validation(field("bed_count"), "must be at least 1"));
    }
    if room.max_occupancy == 0 {
        return Err(ListingError::validation(field("max_occupancy"), "must be at least 1"));
    }
    if !(room.area_sqm.is_finite() && room.area_sqm > 0.0) {
        return Err(ListingError::validation(field("area_sqm"), "must be positive"));
    }
    if room.floor_min > room.floor_max {
        return Err(ListingError::validation(
            field("floor_min"),
            "must not exceed floor_max",
        ));
    }
    check_stock(field("total_stock"), room.total_stock)?;
    check_price(&field("price"), room.price)?;

    Ok(())
}

/// Validate a stock-only update batch.
///
/// # Errors
///
/// Returns [`ListingError::Validation`] if the batch is empty, names a
/// room twice, or asks for more stock than can be stored.
pub fn validate_stock_updates(updates: &[StockUpdate]) -> Result<()> {
    if updates.is_empty() {
        return Err(ListingError::validation("updates", "must not be empty"));
    }

    let mut seen = HashSet::new();
    for (i, update) in updates.iter().enumerate() {
        check_stock(format!("updates[{i}].new_stock"), update.new_stock)?;
        if !seen.insert(update.room_id) {
            return Err(ListingError::validation(
                format!("updates[{i}].room_id"),
                format!("room {} appears more than once", update.room_id),
            ));
        }
    }

    Ok(())
}
