//! External collaborator traits, in-memory fakes and HTTP clients.

pub mod gateway;
pub mod http;
pub mod orders;

pub use gateway::{InMemoryPaymentGateway, PaymentGateway};
pub use http::{HttpOrderBackend, HttpPaymentGateway};
pub use orders::{InMemoryOrderBackend, OrderBackend};
