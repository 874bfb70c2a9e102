//! Identifiers shared by every crate in the checkout client.

mod types;

pub use types::{DraftId, LinkId};
