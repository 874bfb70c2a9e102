//! Payment-to-order reconciliation saga.
//!
//! A customer pays for an order out of band, through a payment link, and the
//! order is created only once the payment is settled. The saga has two
//! entry points sharing one submission path:
//!
//! 1. [`PaymentSession`] creates the link, polls its status and submits the
//!    order when settlement is confirmed.
//! 2. [`ReturnFlowReconciler`] resumes a checkout after the customer comes
//!    back from paying, with or without a payment identifier.
//!
//! Orders are always submitted under an idempotency token derived from the
//! link (or the draft), so retries never create a second order.

pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod instance;
pub mod poller;
pub mod reconciler;
pub mod services;
pub mod settlement;
pub mod state;
mod submission;

pub use config::SessionConfig;
pub use controller::PaymentSession;
pub use error::{GatewayError, OrderError, SagaError};
pub use events::SessionEvent;
pub use instance::{SessionInstance, Transition};
pub use reconciler::{ReconcileOutcome, ReturnContext, ReturnFlowReconciler, UserNotice};
pub use services::{
    HttpOrderBackend, HttpPaymentGateway, InMemoryOrderBackend, InMemoryPaymentGateway,
    OrderBackend, PaymentGateway,
};
pub use settlement::{AmbiguousSettlement, SettlementStatus};
pub use state::SessionState;
