//! Order confirmation and idempotency key.

use chrono::{DateTime, Utc};
use common::{DraftId, LinkId};
use serde::{Deserialize, Serialize};

/// Key under which the order backend deduplicates order creation.
///
/// Derived from the payment link when there is one, otherwise from the
/// draft. Both sources are stable across retries, reloads and repeated
/// detections of "paid", so resubmitting never creates a second order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyToken(String);

impl IdempotencyToken {
    /// Token for an order paid through the given link.
    pub fn for_link(link_id: &LinkId) -> Self {
        Self(format!("link-{link_id}"))
    }

    /// Fallback token for a draft submitted without a payment link.
    pub fn for_draft(draft_id: DraftId) -> Self {
        Self(format!("draft-{draft_id}"))
    }

    /// Picks the link-derived token when a link is known, the draft token otherwise.
    pub fn for_submission(draft_id: DraftId, link_id: Option<&LinkId>) -> Self {
        match link_id {
            Some(link_id) => Self::for_link(link_id),
            None => Self::for_draft(draft_id),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdempotencyToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The order backend's confirmation of a created order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciledOrder {
    pub order_number: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_id: Option<LinkId>,
    /// Token the order was created under.
    pub idempotency_token: IdempotencyToken,
}
