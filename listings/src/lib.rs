//! # Hotel Listings
//!
//! Transactional core of a hotel-listing platform: merchants submit hotels
//! with room offerings and images, administrators moderate them, and guests
//! search the approved catalogue.
//!
//! ## Components
//!
//! - **Cache Gateway** ([`cache`]): read-through cache with a declarative
//!   mutation-to-keys invalidation table
//! - **Idempotency Guard** ([`idempotency`]): at-most-once admission of
//!   write requests via an atomic claim
//! - **Inventory Reconciler** ([`reconciler`]): diffs submitted rooms
//!   against stored rooms inside one transaction
//! - **Audit State Machine** ([`moderation`]): legal status transitions,
//!   each with an immutable audit record
//! - **Search Compiler** ([`search`]): guest filters to a predicate
//!   conjunction with ordering and paging
//! - **Read Projector** ([`projection`]): owner, admin and public views
//!
//! [`ListingService`] wires them together over a [`providers::ListingStore`]
//! and a [`providers::KeyValueStore`].
//!
//! ## Architecture
//!
//! ```text
//! role check → validate → claim → begin → reconcile/moderate → commit → invalidate
//! ```
//!
//! ## Example: submit and approve
//!
//! ```rust,ignore
//! use hotel_listings::*;
//!
//! let service = stores::connect(&AppConfig::from_env()).await?;
//!
//! let merchant = Principal::merchant(7);
//! let saved = service.save_listing(&merchant, "req-1", &payload).await?;
//!
//! let admin = Principal::admin(1);
//! service
//!     .audit(&admin, "req-2", saved.listing_id, ListingStatus::Approved, None)
//!     .await?;
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

// Public modules
pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod idempotency;
pub mod moderation;
pub mod projection;
pub mod providers;
pub mod reconciler;
pub mod search;
pub mod service;
pub mod state;
pub mod stores;
pub mod telemetry;
pub mod validation;

// Test utilities (available in tests or with test-utils feature)
#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

// Re-export main types for convenience
pub use config::{AppConfig, ListingConfig};
pub use error::{ListingError, Result};
pub use moderation::ModerationOutcome;
pub use projection::{ListingView, Viewer};
pub use reconciler::{SaveOutcome, StockItemResult, StockReport};
pub use search::{SearchFilters, SearchHit};
pub use service::ListingService;
pub use state::{
    ListingId, ListingPayload, ListingStatus, Page, PageRequest, Principal, Role, RoomId,
    RoomPayload, StockUpdate, UserId,
};
