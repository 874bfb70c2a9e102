//! Payment session instance.

use chrono::{DateTime, Utc};
use domain::{PaymentLink, PaymentOutcome, ReconciledOrder};
use serde::{Deserialize, Serialize};

use crate::error::SagaError;
use crate::events::SessionEvent;
use crate::state::SessionState;

/// One recorded state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: SessionState,
    pub to: SessionState,
    pub event: String,
    pub at: DateTime<Utc>,
}

/// State of one payment session, built by applying [`SessionEvent`]s.
///
/// Tracks context accumulated along the way (the link, the confirmed
/// outcome, the created order) and the history of transitions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionInstance {
    state: SessionState,
    link: Option<PaymentLink>,
    outcome: Option<PaymentOutcome>,
    order: Option<ReconciledOrder>,
    failure_reason: Option<String>,
    history: Vec<Transition>,
}

impl SessionInstance {
    /// Validates and applies an event.
    ///
    /// Returns the previous state. An event whose target is not reachable from
    /// the current state leaves the instance untouched.
    pub fn transition(&mut self, event: SessionEvent) -> Result<SessionState, SagaError> {
        let from = self.state;
        let to = event.target_state();
        if !from.can_transition_to(to) {
            return Err(SagaError::InvalidState {
                expected: format!("a state that can move to {to}"),
                actual: from,
            });
        }

        self.history.push(Transition {
            from,
            to,
            event: event.event_type().to_string(),
            at: Utc::now(),
        });
        self.apply(event);
        Ok(from)
    }

    fn apply(&mut self, event: SessionEvent) {
        self.state = event.target_state();
        match event {
            SessionEvent::LinkCreated { link } => {
                self.link = Some(link);
            }
            SessionEvent::SettlementConfirmed { outcome } => {
                self.outcome = Some(outcome);
            }
            SessionEvent::OrderConfirmed { order } => {
                self.order = Some(order);
            }
            SessionEvent::LinkFailed { reason }
            | SessionEvent::SubmissionFailed { reason }
            | SessionEvent::TimedOut { reason } => {
                self.failure_reason = Some(reason);
            }
            SessionEvent::LinkRequested { .. }
            | SessionEvent::PollingStarted
            | SessionEvent::SubmissionStarted { .. }
            | SessionEvent::Cancelled => {}
        }
    }
}

// Query methods
impl SessionInstance {
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the payment link, once created.
    pub fn link(&self) -> Option<&PaymentLink> {
        self.link.as_ref()
    }

    /// Returns the settlement that moved the session to `Paid`.
    pub fn outcome(&self) -> Option<&PaymentOutcome> {
        self.outcome.as_ref()
    }

    /// Returns the confirmed order, once `Done`.
    pub fn order(&self) -> Option<&ReconciledOrder> {
        self.order.as_ref()
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn history(&self) -> &[Transition] {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use domain::{LinkId, LinkStatus, Money};

    fn link() -> PaymentLink {
        PaymentLink {
            link_id: LinkId::new("L1"),
            amount: Money::from_cents(500),
            status: LinkStatus::Created,
            url: "https://pay.example/L1".to_string(),
            qr_code: None,
            expires_at: Utc::now() + Duration::minutes(15),
        }
    }

    #[test]
    fn test_link_lifecycle() {
        let mut session = SessionInstance::default();
        session
            .transition(SessionEvent::LinkRequested {
                amount: Money::from_cents(500),
            })
            .unwrap();
        session
            .transition(SessionEvent::LinkCreated { link: link() })
            .unwrap();

        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.link().unwrap().link_id, LinkId::new("L1"));
        assert_eq!(session.history().len(), 2);
        assert_eq!(session.history()[1].event, "LinkCreated");
    }

    #[test]
    fn test_invalid_transition_is_rejected_without_change() {
        let mut session = SessionInstance::default();
        let result = session.transition(SessionEvent::PollingStarted);

        assert!(matches!(
            result,
            Err(SagaError::InvalidState {
                actual: SessionState::Idle,
                ..
            })
        ));
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.history().is_empty());
    }

    #[test]
    fn test_failure_reason_recorded() {
        let mut session = SessionInstance::default();
        session
            .transition(SessionEvent::LinkRequested {
                amount: Money::from_cents(500),
            })
            .unwrap();
        session
            .transition(SessionEvent::LinkFailed {
                reason: "gateway down".to_string(),
            })
            .unwrap();

        assert_eq!(session.state(), SessionState::LinkFailed);
        assert_eq!(session.failure_reason(), Some("gateway down"));
        assert!(session.state().is_terminal());
    }
}
