//! Payment link and settlement types reported by the payment gateway.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::LinkId;
use serde::{Deserialize, Serialize};

use crate::money::Money;

/// Status of a payment link as reported by the gateway.
///
/// Only the gateway advances this; the client observes it by polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkStatus {
    #[default]
    Created,
    AwaitingPayment,
    Paid,
    Expired,
}

impl LinkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStatus::Created => "CREATED",
            LinkStatus::AwaitingPayment => "AWAITING_PAYMENT",
            LinkStatus::Paid => "PAID",
            LinkStatus::Expired => "EXPIRED",
        }
    }
}

impl std::fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parameters for creating a payment link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateLinkRequest {
    pub amount: Money,
    pub payer_contact: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl CreateLinkRequest {
    pub fn new(amount: Money, payer_contact: impl Into<String>) -> Self {
        Self {
            amount,
            payer_contact: payer_contact.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A payment request created by the gateway that the customer pays out of band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentLink {
    pub link_id: LinkId,
    pub amount: Money,
    pub status: LinkStatus,
    /// URL the customer follows to pay.
    pub url: String,
    /// Optional scannable code (image data or payload).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_code: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl PaymentLink {
    /// Returns true if the link can no longer be paid at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == LinkStatus::Expired || now >= self.expires_at
    }
}

/// Evidence that money actually moved for a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub reference: String,
    pub amount: Money,
    pub settled_at: DateTime<Utc>,
}

/// Result of a status query for a link. Ephemeral; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentOutcome {
    pub link_id: LinkId,
    pub status: LinkStatus,
    pub amount_paid: Money,
    #[serde(default)]
    pub settlement_records: Vec<SettlementRecord>,
}

impl PaymentOutcome {
    /// An outcome for a link nobody has paid yet.
    pub fn unpaid(link_id: LinkId, status: LinkStatus) -> Self {
        Self {
            link_id,
            status,
            amount_paid: Money::zero(),
            settlement_records: Vec::new(),
        }
    }

    /// True when a positive amount was paid and backed by at least one record.
    pub fn has_settlement_evidence(&self) -> bool {
        self.amount_paid.is_positive() && !self.settlement_records.is_empty()
    }
}
