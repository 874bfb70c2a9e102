//! Return-flow reconciler.

use std::collections::HashMap;
use std::time::Duration;

use domain::{LinkId, LinkStatus, PendingOrderDraft, ReconciledOrder};
use draft_store::DraftStore;

use crate::config::DEFAULT_QUERY_TIMEOUT;
use crate::error::{OrderError, SagaError};
use crate::poller;
use crate::services::gateway::PaymentGateway;
use crate::services::orders::OrderBackend;
use crate::settlement::{AmbiguousSettlement, SettlementStatus};
use crate::submission;

/// Query parameters that may carry the payment link on return, in priority order.
pub const LINK_PARAMS: [&str; 4] = ["link_id", "linkId", "payment_link_id", "reference"];

/// What the application knows when the customer comes back from paying.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReturnContext {
    pub link_id: Option<LinkId>,
}

impl ReturnContext {
    /// A return with no payment identifier at all.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_link(link_id: LinkId) -> Self {
        Self {
            link_id: Some(link_id),
        }
    }

    /// Recovers the link from return-URL query parameters.
    ///
    /// The first non-blank parameter from [`LINK_PARAMS`] wins. No parameter
    /// at all is a valid, expected return.
    pub fn from_query(params: &HashMap<String, String>) -> Self {
        let link_id = LINK_PARAMS
            .iter()
            .filter_map(|key| params.get(*key))
            .find_map(|raw| LinkId::parse(raw));
        Self { link_id }
    }
}

/// What the customer should be told about a failed reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserNotice {
    /// Nothing went wrong.
    None,
    /// Payment status unknown or not made, order not created. Safe to retry.
    SafeToRetry,
    /// Payment succeeded but the order was not created. Needs manual follow-up.
    ContactSupport,
}

impl UserNotice {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserNotice::None => "none",
            UserNotice::SafeToRetry => "safe_to_retry",
            UserNotice::ContactSupport => "contact_support",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            UserNotice::None => "",
            UserNotice::SafeToRetry => {
                "Payment status unknown and the order was not created. It is safe to try again."
            }
            UserNotice::ContactSupport => {
                "Your payment went through but the order could not be created. Please contact support."
            }
        }
    }
}

/// Terminal result of one reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Payment confirmed and order created.
    Completed { order: ReconciledOrder },

    /// Order created, but the payment could not be verified.
    CompletedUnverified {
        order: ReconciledOrder,
        ambiguity: AmbiguousSettlement,
    },

    /// No payment identifier came back; order created without one.
    CompletedWithoutPayment { order: ReconciledOrder },

    /// The gateway reported money paid, in full or in part, and order
    /// creation failed.
    PaidButOrderFailed { link_id: LinkId, error: OrderError },

    /// The status query failed and the order could not be created.
    UnverifiedNotCreated {
        ambiguity: AmbiguousSettlement,
        error: OrderError,
    },

    /// No payment identifier came back and the order could not be created.
    OrderNotCreated { error: OrderError },

    /// The gateway reports nothing paid for the link.
    PaymentNotCompleted { link_id: LinkId, status: LinkStatus },
}

impl ReconcileOutcome {
    /// Returns the created order, if any.
    pub fn order(&self) -> Option<&ReconciledOrder> {
        match self {
            ReconcileOutcome::Completed { order }
            | ReconcileOutcome::CompletedUnverified { order, .. }
            | ReconcileOutcome::CompletedWithoutPayment { order } => Some(order),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.order().is_some()
    }

    pub fn notice(&self) -> UserNotice {
        match self {
            ReconcileOutcome::Completed { .. }
            | ReconcileOutcome::CompletedUnverified { .. }
            | ReconcileOutcome::CompletedWithoutPayment { .. } => UserNotice::None,
            ReconcileOutcome::PaidButOrderFailed { .. } => UserNotice::ContactSupport,
            ReconcileOutcome::UnverifiedNotCreated { .. }
            | ReconcileOutcome::OrderNotCreated { .. }
            | ReconcileOutcome::PaymentNotCompleted { .. } => UserNotice::SafeToRetry,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Completed { .. } => "completed",
            ReconcileOutcome::CompletedUnverified { .. } => "completed_unverified",
            ReconcileOutcome::CompletedWithoutPayment { .. } => "completed_without_payment",
            ReconcileOutcome::PaidButOrderFailed { .. } => "paid_but_order_failed",
            ReconcileOutcome::UnverifiedNotCreated { .. } => "unverified_not_created",
            ReconcileOutcome::OrderNotCreated { .. } => "order_not_created",
            ReconcileOutcome::PaymentNotCompleted { .. } => "payment_not_completed",
        }
    }
}

/// Resumes a checkout when the customer re-enters the application after
/// leaving to pay.
///
/// Reads the pending draft, works out what happened to the payment from
/// whatever identifier came back, and drives the same submission path as the
/// session controller. When the payment outcome is ambiguous it submits
/// anyway rather than drop a payment that may have gone through; the
/// idempotency token keeps that from ever creating a second order.
pub struct ReturnFlowReconciler<G, O, D>
where
    G: PaymentGateway,
    O: OrderBackend,
    D: DraftStore,
{
    gateway: G,
    orders: O,
    drafts: D,
    query_timeout: Duration,
}

impl<G, O, D> ReturnFlowReconciler<G, O, D>
where
    G: PaymentGateway,
    O: OrderBackend,
    D: DraftStore,
{
    pub fn new(gateway: G, orders: O, drafts: D) -> Self {
        Self {
            gateway,
            orders,
            drafts,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    /// Overrides the bound on the settlement status query.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Runs the return-flow policy once.
    ///
    /// Returns `NoPendingOrder` without touching anything when there is no
    /// draft. Draft store failures are returned as errors; every other
    /// result is a [`ReconcileOutcome`].
    #[tracing::instrument(skip(self), fields(link_id = ?ctx.link_id))]
    pub async fn reconcile(&self, ctx: &ReturnContext) -> Result<ReconcileOutcome, SagaError> {
        let Some(draft) = self.drafts.load().await? else {
            metrics::counter!("reconciliations_total", "outcome" => "no_pending_order")
                .increment(1);
            tracing::info!("return flow found no pending order");
            return Err(SagaError::NoPendingOrder);
        };

        let outcome = match &ctx.link_id {
            Some(link_id) => self.reconcile_link(&draft, link_id).await,
            None => self.submit_without_payment(&draft).await,
        };

        metrics::counter!("reconciliations_total", "outcome" => outcome.as_str()).increment(1);
        tracing::info!(
            outcome = outcome.as_str(),
            notice = outcome.notice().as_str(),
            "return flow reconciled"
        );
        Ok(outcome)
    }

    async fn reconcile_link(&self, draft: &PendingOrderDraft, link_id: &LinkId) -> ReconcileOutcome {
        let status = poller::query_status(&self.gateway, link_id, self.query_timeout).await;
        tracing::debug!(status = status.as_str(), "settlement status queried");

        // A positive paid amount means money moved even when it cannot be
        // matched to the draft; a failed submission then needs support.
        let (ambiguity, paid) = match status {
            SettlementStatus::Paid(outcome) if outcome.amount_paid >= draft.total() => {
                return self.submit_paid(draft, link_id).await;
            }
            SettlementStatus::Paid(outcome) => (
                AmbiguousSettlement {
                    link_id: link_id.clone(),
                    reason: format!("paid {} of {}", outcome.amount_paid, draft.total()),
                },
                true,
            ),
            SettlementStatus::Unsettled(outcome) if outcome.amount_paid.is_positive() => (
                AmbiguousSettlement {
                    link_id: link_id.clone(),
                    reason: format!(
                        "{} reported paid without settlement records",
                        outcome.amount_paid
                    ),
                },
                true,
            ),
            SettlementStatus::Unsettled(outcome) => {
                return ReconcileOutcome::PaymentNotCompleted {
                    link_id: link_id.clone(),
                    status: outcome.status,
                };
            }
            SettlementStatus::QueryFailed(e) => (
                AmbiguousSettlement {
                    link_id: link_id.clone(),
                    reason: e.to_string(),
                },
                false,
            ),
        };

        tracing::warn!(%ambiguity, paid, "submitting order without verified payment");
        match self.submit(draft, Some(link_id)).await {
            Ok(order) => ReconcileOutcome::CompletedUnverified { order, ambiguity },
            Err(error) if paid => {
                tracing::error!(%ambiguity, %error, "payment received but order creation failed");
                ReconcileOutcome::PaidButOrderFailed {
                    link_id: link_id.clone(),
                    error,
                }
            }
            Err(error) => ReconcileOutcome::UnverifiedNotCreated { ambiguity, error },
        }
    }

    async fn submit_paid(&self, draft: &PendingOrderDraft, link_id: &LinkId) -> ReconcileOutcome {
        match self.submit(draft, Some(link_id)).await {
            Ok(order) => ReconcileOutcome::Completed { order },
            Err(error) => {
                tracing::error!(%link_id, %error, "payment settled but order creation failed");
                ReconcileOutcome::PaidButOrderFailed {
                    link_id: link_id.clone(),
                    error,
                }
            }
        }
    }

    async fn submit_without_payment(&self, draft: &PendingOrderDraft) -> ReconcileOutcome {
        match self.submit(draft, None).await {
            Ok(order) => ReconcileOutcome::CompletedWithoutPayment { order },
            Err(error) => ReconcileOutcome::OrderNotCreated { error },
        }
    }

    async fn submit(
        &self,
        draft: &PendingOrderDraft,
        link_id: Option<&LinkId>,
    ) -> Result<ReconciledOrder, OrderError> {
        let token = submission::token_for(draft, link_id);
        submission::submit_and_clear(&self.orders, &self.drafts, draft, &token, link_id).await
    }
}
