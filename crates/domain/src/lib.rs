//! Data model for the checkout reconciliation client.
//!
//! This crate holds the plain value types that flow between the draft store,
//! the payment gateway, the order backend and the saga that ties them together:
//! - `PendingOrderDraft`: the order the customer intends to place
//! - `PaymentLink` / `PaymentOutcome`: what the gateway reports
//! - `ReconciledOrder` / `IdempotencyToken`: what the order backend confirms

pub mod draft;
pub mod money;
pub mod order;
pub mod payment;

pub use common::{DraftId, LinkId};
pub use draft::{DeliveryTarget, DraftError, OrderLine, PendingOrderDraft};
pub use money::Money;
pub use order::{IdempotencyToken, ReconciledOrder};
pub use payment::{CreateLinkRequest, LinkStatus, PaymentLink, PaymentOutcome, SettlementRecord};
