//! Payment session state machine.

use serde::{Deserialize, Serialize};

/// The state of a payment session in its lifecycle.
///
/// State transitions:
/// ```text
/// Idle ──► Creating ──┬──► Ready ──► Awaiting ──┬──► Paid ──► Submitting ──┬──► Done
///                     └──► LinkFailed            ├──► TimedOut              └──► SubmitFailed
///                                                └──► Cancelled
/// ```
/// A `Ready` session may also be cancelled before the customer leaves to pay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// Session opened, nothing requested yet.
    #[default]
    Idle,

    /// Payment link requested from the gateway.
    Creating,

    /// Link obtained and shown to the customer.
    Ready,

    /// Customer left to pay; polling is active.
    Awaiting,

    /// Settlement confirmed, no order yet.
    Paid,

    /// Order creation call in flight.
    Submitting,

    /// Order confirmed (terminal).
    Done,

    /// Link creation failed (terminal).
    LinkFailed,

    /// Order creation failed after payment (terminal, draft kept).
    SubmitFailed,

    /// Payment was not observed within the wait bound (terminal).
    TimedOut,

    /// Session closed by the customer (terminal).
    Cancelled,
}

impl SessionState {
    /// Returns true if the machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Creating)
                | (Creating, Ready)
                | (Creating, LinkFailed)
                | (Ready, Awaiting)
                | (Ready, Cancelled)
                | (Awaiting, Paid)
                | (Awaiting, TimedOut)
                | (Awaiting, Cancelled)
                | (Paid, Submitting)
                | (Submitting, Done)
                | (Submitting, SubmitFailed)
        )
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Done
                | SessionState::LinkFailed
                | SessionState::SubmitFailed
                | SessionState::TimedOut
                | SessionState::Cancelled
        )
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "IDLE",
            SessionState::Creating => "CREATING",
            SessionState::Ready => "READY",
            SessionState::Awaiting => "AWAITING",
            SessionState::Paid => "PAID",
            SessionState::Submitting => "SUBMITTING",
            SessionState::Done => "DONE",
            SessionState::LinkFailed => "LINK_FAILED",
            SessionState::SubmitFailed => "SUBMIT_FAILED",
            SessionState::TimedOut => "TIMED_OUT",
            SessionState::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
