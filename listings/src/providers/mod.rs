//! Storage provider traits.
//!
//! Production implementations live in [`stores`](crate::stores), in-memory
//! implementations in `mocks` (behind the `test-utils` feature).

pub mod key_value;
pub mod listing_store;

pub use key_value::KeyValueStore;
pub use listing_store::{
    ListQuery, ListingOverview, ListingStore, ListingTransaction, NewAuditRecord,
};
