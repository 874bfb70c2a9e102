//! The single order-submission path shared by the controller and the reconciler.

use domain::{IdempotencyToken, LinkId, PendingOrderDraft, ReconciledOrder};
use draft_store::DraftStore;

use crate::error::OrderError;
use crate::services::orders::OrderBackend;

/// Submits `draft` under its idempotency token and clears the draft on success.
///
/// Only this draft is cleared; a newer one saved by a later checkout stays.
/// The draft is kept on failure so a later retry or return flow can recover
/// it. A failure to clear after a confirmed order is logged, not returned:
/// the order exists, and resubmitting the leftover draft reuses the token.
#[tracing::instrument(skip(orders, drafts, draft, token), fields(draft_id = %draft.draft_id, %token))]
pub(crate) async fn submit_and_clear<O, D>(
    orders: &O,
    drafts: &D,
    draft: &PendingOrderDraft,
    token: &IdempotencyToken,
    link_id: Option<&LinkId>,
) -> Result<ReconciledOrder, OrderError>
where
    O: OrderBackend + ?Sized,
    D: DraftStore + ?Sized,
{
    match orders.create_order(draft, token, link_id).await {
        Ok(order) => {
            metrics::counter!("order_submissions_total", "result" => "ok").increment(1);
            tracing::info!(order_number = %order.order_number, "order confirmed");
            match drafts.clear_if(draft.draft_id).await {
                Ok(true) => {}
                Ok(false) => tracing::debug!("draft already replaced, leaving it"),
                Err(e) => {
                    tracing::warn!(error = %e, "order confirmed but draft could not be cleared")
                }
            }
            Ok(order)
        }
        Err(e) => {
            metrics::counter!("order_submissions_total", "result" => "error").increment(1);
            tracing::warn!(error = %e, "order submission failed, draft kept");
            Err(e)
        }
    }
}

/// Token for submitting `draft`, derived from the link when one is known.
pub(crate) fn token_for(draft: &PendingOrderDraft, link_id: Option<&LinkId>) -> IdempotencyToken {
    IdempotencyToken::for_submission(draft.draft_id, link_id)
}
