//! Classification of status query results.

use domain::{LinkId, PaymentOutcome};

use crate::error::GatewayError;

/// What a single status query tells us about a link.
///
/// Keeps "the query failed" apart from "nothing has been paid yet" so callers
/// can branch on data instead of on errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementStatus {
    /// A positive amount was paid and backed by settlement records.
    Paid(PaymentOutcome),

    /// The gateway answered, but without settlement evidence.
    Unsettled(PaymentOutcome),

    /// The gateway could not be asked.
    QueryFailed(GatewayError),
}

impl SettlementStatus {
    pub fn classify(result: Result<PaymentOutcome, GatewayError>) -> Self {
        match result {
            Ok(outcome) if outcome.has_settlement_evidence() => SettlementStatus::Paid(outcome),
            Ok(outcome) => SettlementStatus::Unsettled(outcome),
            Err(e) => SettlementStatus::QueryFailed(e),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementStatus::Paid(_) => "paid",
            SettlementStatus::Unsettled(_) => "unsettled",
            SettlementStatus::QueryFailed(_) => "query_failed",
        }
    }
}

/// Why a payment could not be confirmed even though money may have moved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbiguousSettlement {
    pub link_id: LinkId,
    pub reason: String,
}

impl std::fmt::Display for AmbiguousSettlement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "settlement of {} unverified: {}", self.link_id, self.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::{LinkStatus, Money, SettlementRecord};

    fn outcome(paid: i64, records: usize) -> PaymentOutcome {
        PaymentOutcome {
            link_id: LinkId::new("L1"),
            status: LinkStatus::Paid,
            amount_paid: Money::from_cents(paid),
            settlement_records: (0..records)
                .map(|i| SettlementRecord {
                    reference: format!("TX-{i}"),
                    amount: Money::from_cents(paid),
                    settled_at: Utc::now(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_paid_requires_amount_and_records() {
        assert!(matches!(
            SettlementStatus::classify(Ok(outcome(500, 1))),
            SettlementStatus::Paid(_)
        ));
        assert!(matches!(
            SettlementStatus::classify(Ok(outcome(0, 1))),
            SettlementStatus::Unsettled(_)
        ));
        assert!(matches!(
            SettlementStatus::classify(Ok(outcome(500, 0))),
            SettlementStatus::Unsettled(_)
        ));
    }

    #[test]
    fn test_error_is_query_failed() {
        let status =
            SettlementStatus::classify(Err(GatewayError::Unavailable("down".to_string())));
        assert_eq!(status.as_str(), "query_failed");
    }
}
