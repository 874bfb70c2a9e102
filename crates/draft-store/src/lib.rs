//! Durable single-slot storage for the pending order draft.
//!
//! The store holds at most one draft. Saving overwrites whatever was there,
//! loading never removes it, and only an explicit `clear` deletes it. There is
//! no expiry; payment link expiry and the polling timeout bound the wait.

pub mod error;
pub mod file;
pub mod memory;
pub mod store;

pub use error::{DraftStoreError, Result};
pub use file::{FileDraftStore, SCHEMA_VERSION};
pub use memory::InMemoryDraftStore;
pub use store::DraftStore;
