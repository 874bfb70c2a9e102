//! Payment gateway trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use domain::{
    CreateLinkRequest, LinkId, LinkStatus, Money, PaymentLink, PaymentOutcome, SettlementRecord,
};

use crate::error::GatewayError;

/// Client for the external payment gateway.
///
/// Pure request/response; implementations hold no session state.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a payment link the customer can pay out of band.
    async fn create_link(&self, request: &CreateLinkRequest) -> Result<PaymentLink, GatewayError>;

    /// Reads the current settlement status of a link.
    ///
    /// An unpaid link is an `Ok` outcome with zero paid, not an error.
    async fn status(&self, link_id: &LinkId) -> Result<PaymentOutcome, GatewayError>;
}

#[derive(Debug)]
struct LinkEntry {
    link: PaymentLink,
    amount_paid: Money,
    records: Vec<SettlementRecord>,
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    links: HashMap<LinkId, LinkEntry>,
    next_id: u32,
    fail_on_create: bool,
    fail_on_status: bool,
    amount_override: Option<Money>,
    status_queries: usize,
}

/// In-memory payment gateway for testing.
///
/// Link IDs are `L1`, `L2`, ... Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl InMemoryPaymentGateway {
    /// Creates a new in-memory gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures link creation to fail.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create = fail;
    }

    /// Configures status queries to fail.
    pub fn set_fail_on_status(&self, fail: bool) {
        self.state.write().unwrap().fail_on_status = fail;
    }

    /// Makes the gateway create links for `amount` regardless of the request.
    pub fn set_amount_override(&self, amount: Option<Money>) {
        self.state.write().unwrap().amount_override = amount;
    }

    /// Records a settled payment against a link.
    ///
    /// The link becomes `PAID` once the settled total covers its amount.
    pub fn record_payment(&self, link_id: &LinkId, amount: Money) {
        let mut state = self.state.write().unwrap();
        if let Some(entry) = state.links.get_mut(link_id) {
            entry.amount_paid += amount;
            entry.records.push(SettlementRecord {
                reference: format!("TX-{}-{}", link_id, entry.records.len() + 1),
                amount,
                settled_at: Utc::now(),
            });
            entry.link.status = if entry.amount_paid >= entry.link.amount {
                LinkStatus::Paid
            } else {
                LinkStatus::AwaitingPayment
            };
        }
    }

    /// Reports a paid amount with no settlement records behind it.
    pub fn report_unbacked_amount(&self, link_id: &LinkId, amount: Money) {
        let mut state = self.state.write().unwrap();
        if let Some(entry) = state.links.get_mut(link_id) {
            entry.amount_paid = amount;
            entry.link.status = LinkStatus::Paid;
        }
    }

    /// Marks an unpaid link as expired.
    pub fn expire(&self, link_id: &LinkId) {
        let mut state = self.state.write().unwrap();
        if let Some(entry) = state.links.get_mut(link_id) {
            entry.link.status = LinkStatus::Expired;
        }
    }

    /// Returns the number of links created.
    pub fn link_count(&self) -> usize {
        self.state.read().unwrap().links.len()
    }

    /// Returns the number of status queries served, failed ones included.
    pub fn status_query_count(&self) -> usize {
        self.state.read().unwrap().status_queries
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn create_link(&self, request: &CreateLinkRequest) -> Result<PaymentLink, GatewayError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_create {
            return Err(GatewayError::Unavailable(
                "connection refused".to_string(),
            ));
        }

        state.next_id += 1;
        let link_id = LinkId::new(format!("L{}", state.next_id));
        let link = PaymentLink {
            link_id: link_id.clone(),
            amount: state.amount_override.unwrap_or(request.amount),
            status: LinkStatus::Created,
            url: format!("https://pay.example/{link_id}"),
            qr_code: Some(format!("qr:{link_id}")),
            expires_at: Utc::now() + Duration::minutes(15),
        };
        state.links.insert(
            link_id,
            LinkEntry {
                link: link.clone(),
                amount_paid: Money::zero(),
                records: Vec::new(),
            },
        );

        Ok(link)
    }

    async fn status(&self, link_id: &LinkId) -> Result<PaymentOutcome, GatewayError> {
        let mut state = self.state.write().unwrap();
        state.status_queries += 1;

        if state.fail_on_status {
            return Err(GatewayError::Unavailable("network error".to_string()));
        }

        let entry = state.links.get_mut(link_id).ok_or(GatewayError::Rejected {
            status: 404,
            body: format!("unknown link {link_id}"),
        })?;
        if entry.link.status == LinkStatus::Created {
            entry.link.status = LinkStatus::AwaitingPayment;
        }

        Ok(PaymentOutcome {
            link_id: link_id.clone(),
            status: entry.link.status,
            amount_paid: entry.amount_paid,
            settlement_records: entry.records.clone(),
        })
    }
}
