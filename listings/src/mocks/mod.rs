//! Mock provider implementations for testing.
//!
//! In-memory implementations of the storage traits, used by unit and
//! integration tests.

pub mod key_value;
pub mod listing_store;

pub use key_value::MockKeyValueStore;
pub use listing_store::{InMemoryListingStore, InMemoryTransaction};
