//! Payment session events.

use domain::{IdempotencyToken, Money, PaymentLink, PaymentOutcome, ReconciledOrder};
use serde::{Deserialize, Serialize};

use crate::state::SessionState;

/// Everything that can happen to a payment session.
///
/// Each event moves the session into exactly one state; see
/// [`SessionEvent::target_state`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SessionEvent {
    /// A payment link was requested from the gateway.
    LinkRequested { amount: Money },

    /// The gateway created the link.
    LinkCreated { link: PaymentLink },

    /// The gateway could not create the link.
    LinkFailed { reason: String },

    /// The customer left to pay and polling started.
    PollingStarted,

    /// A status query confirmed settlement.
    SettlementConfirmed { outcome: PaymentOutcome },

    /// The order creation call was sent.
    SubmissionStarted { token: IdempotencyToken },

    /// The order backend confirmed the order.
    OrderConfirmed { order: ReconciledOrder },

    /// The order backend call failed.
    SubmissionFailed { reason: String },

    /// Payment was not observed in time, or the link expired.
    TimedOut { reason: String },

    /// The session was closed by the customer.
    Cancelled,
}

impl SessionEvent {
    /// The state the session is in after this event.
    pub fn target_state(&self) -> SessionState {
        match self {
            SessionEvent::LinkRequested { .. } => SessionState::Creating,
            SessionEvent::LinkCreated { .. } => SessionState::Ready,
            SessionEvent::LinkFailed { .. } => SessionState::LinkFailed,
            SessionEvent::PollingStarted => SessionState::Awaiting,
            SessionEvent::SettlementConfirmed { .. } => SessionState::Paid,
            SessionEvent::SubmissionStarted { .. } => SessionState::Submitting,
            SessionEvent::OrderConfirmed { .. } => SessionState::Done,
            SessionEvent::SubmissionFailed { .. } => SessionState::SubmitFailed,
            SessionEvent::TimedOut { .. } => SessionState::TimedOut,
            SessionEvent::Cancelled => SessionState::Cancelled,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::LinkRequested { .. } => "LinkRequested",
            SessionEvent::LinkCreated { .. } => "LinkCreated",
            SessionEvent::LinkFailed { .. } => "LinkFailed",
            SessionEvent::PollingStarted => "PollingStarted",
            SessionEvent::SettlementConfirmed { .. } => "SettlementConfirmed",
            SessionEvent::SubmissionStarted { .. } => "SubmissionStarted",
            SessionEvent::OrderConfirmed { .. } => "OrderConfirmed",
            SessionEvent::SubmissionFailed { .. } => "SubmissionFailed",
            SessionEvent::TimedOut { .. } => "TimedOut",
            SessionEvent::Cancelled => "Cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = SessionEvent::LinkRequested {
            amount: Money::from_cents(500),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "LinkRequested");
        assert_eq!(json["data"]["amount"], 500);

        let json = serde_json::to_value(SessionEvent::Cancelled).unwrap();
        assert_eq!(json["type"], "Cancelled");
    }

    #[test]
    fn test_target_states() {
        assert_eq!(
            SessionEvent::PollingStarted.target_state(),
            SessionState::Awaiting
        );
        assert_eq!(
            SessionEvent::TimedOut {
                reason: "deadline".to_string()
            }
            .target_state(),
            SessionState::TimedOut
        );
    }
}
