//! Pending order draft.

use chrono::{DateTime, Utc};
use common::DraftId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::Money;

/// Reasons a draft cannot be used to start a checkout.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DraftError {
    /// Draft has no lines.
    #[error("Draft has no items")]
    NoItems,

    /// A line has a zero quantity.
    #[error("Invalid quantity for {item_id}: {quantity} (must be greater than 0)")]
    InvalidQuantity { item_id: String, quantity: u32 },

    /// A line has a non-positive unit price.
    #[error("Invalid price for {item_id}: {price} (must be greater than 0)")]
    InvalidPrice { item_id: String, price: i64 },

    /// Restaurant is required.
    #[error("Restaurant ID is required")]
    RestaurantRequired,

    /// Payer contact is required.
    #[error("Payer contact is required")]
    ContactRequired,
}

/// A single line of the order the customer intends to place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    /// Menu item identifier.
    pub item_id: String,

    /// Human-readable item name.
    pub name: String,

    /// Quantity ordered.
    pub quantity: u32,

    /// Price per unit.
    pub unit_price: Money,
}

impl OrderLine {
    /// Creates a new order line.
    pub fn new(
        item_id: impl Into<String>,
        name: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            name: name.into(),
            quantity,
            unit_price,
        }
    }

    /// Returns quantity * unit_price.
    pub fn total_price(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// Where the order should be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DeliveryTarget {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl DeliveryTarget {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            instructions: None,
        }
    }
}

/// The order payload the customer intends to place.
///
/// Carries no payment identifiers. Exactly one draft exists per client
/// instance; it is owned by the draft store and only deleted once an order
/// has been confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOrderDraft {
    pub draft_id: DraftId,
    pub restaurant_id: String,
    pub items: Vec<OrderLine>,
    pub delivery: DeliveryTarget,
    pub payer_contact: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PendingOrderDraft {
    /// Creates a new draft with a fresh draft ID.
    pub fn new(
        restaurant_id: impl Into<String>,
        items: Vec<OrderLine>,
        delivery: DeliveryTarget,
        payer_contact: impl Into<String>,
    ) -> Self {
        Self {
            draft_id: DraftId::new(),
            restaurant_id: restaurant_id.into(),
            items,
            delivery,
            payer_contact: payer_contact.into(),
            notes: None,
            created_at: Utc::now(),
        }
    }

    /// Sets free-form notes for the restaurant.
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Returns the sum of all line totals.
    pub fn total(&self) -> Money {
        self.items.iter().map(OrderLine::total_price).sum()
    }

    /// Checks that the draft can be paid for and submitted.
    pub fn validate(&self) -> Result<(), DraftError> {
        if self.restaurant_id.trim().is_empty() {
            return Err(DraftError::RestaurantRequired);
        }
        if self.payer_contact.trim().is_empty() {
            return Err(DraftError::ContactRequired);
        }
        if self.items.is_empty() {
            return Err(DraftError::NoItems);
        }
        for line in &self.items {
            if line.quantity == 0 {
                return Err(DraftError::InvalidQuantity {
                    item_id: line.item_id.clone(),
                    quantity: line.quantity,
                });
            }
            if !line.unit_price.is_positive() {
                return Err(DraftError::InvalidPrice {
                    item_id: line.item_id.clone(),
                    price: line.unit_price.cents(),
                });
            }
        }
        Ok(())
    }
}
