//! Shared fixtures for the listing pipeline integration tests.

#![allow(dead_code)] // Not every test binary uses every fixture

use hotel_listings::mocks::{InMemoryListingStore, MockKeyValueStore};
use hotel_listings::state::ImagePayload;
use hotel_listings::{ListingConfig, ListingPayload, ListingService, RoomId, RoomPayload};
use rust_decimal::Decimal;

pub type TestService = ListingService<InMemoryListingStore, MockKeyValueStore>;

/// A service over in-memory stores, plus handles to its cache and claim
/// stores.
pub struct Harness {
    pub service: TestService,
    pub cache: MockKeyValueStore,
    pub claims: MockKeyValueStore,
}

pub fn harness() -> Harness {
    let cache = MockKeyValueStore::new();
    let claims = MockKeyValueStore::new();
    let service = ListingService::new(
        InMemoryListingStore::new(),
        cache.clone(),
        claims.clone(),
        ListingConfig::default(),
    );
    Harness {
        service,
        cache,
        claims,
    }
}

pub fn room(name: &str, price: i64, stock: u32) -> RoomPayload {
    RoomPayload {
        id: None,
        name: name.to_string(),
        bed_count: 1,
        bed_size: "1.8m".to_string(),
        area_sqm: 28.0,
        max_occupancy: 2,
        floor_min: 3,
        floor_max: 12,
        image_url: None,
        total_stock: stock,
        price: Decimal::new(price, 0),
        is_active: true,
    }
}

pub fn existing_room(id: RoomId, name: &str, price: i64, stock: u32) -> RoomPayload {
    RoomPayload {
        id: Some(id),
        ..room(name, price, stock)
    }
}

pub fn hotel(name: &str, rooms: Vec<RoomPayload>) -> ListingPayload {
    ListingPayload {
        id: None,
        name: name.to_string(),
        hotel_type: "business".to_string(),
        region: "Shanghai".to_string(),
        address: "100 Century Ave".to_string(),
        latitude: 31.2397,
        longitude: 121.4998,
        star_rating: 4,
        facilities: vec!["wifi".to_string(), "gym".to_string()],
        description: Some("Close to the river".to_string()),
        is_featured: true,
        rooms,
        images: vec![
            ImagePayload {
                url: "https://img.example/lobby.jpg".to_string(),
            },
            ImagePayload {
                url: "https://img.example/room.jpg".to_string(),
            },
        ],
    }
}
