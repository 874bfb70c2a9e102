//! Payment session controller.

use std::collections::BTreeMap;

use domain::{
    CreateLinkRequest, IdempotencyToken, LinkStatus, Money, PaymentLink, PaymentOutcome,
    PendingOrderDraft, ReconciledOrder,
};
use draft_store::DraftStore;
use futures_util::StreamExt;
use tokio::sync::{RwLock, watch};

use crate::config::SessionConfig;
use crate::error::{GatewayError, SagaError};
use crate::events::SessionEvent;
use crate::instance::SessionInstance;
use crate::poller;
use crate::services::gateway::PaymentGateway;
use crate::services::orders::OrderBackend;
use crate::settlement::SettlementStatus;
use crate::state::SessionState;
use crate::submission;

/// How the wait for settlement ended.
enum PollEnd {
    Paid(PaymentOutcome),
    TimedOut(String),
    Cancelled,
    /// Something else moved the session out of `Awaiting`.
    Left(SessionState),
}

/// Drives one checkout from link creation to a confirmed order.
///
/// The session requests a payment link, waits while the customer pays out of
/// band, and submits the order once settlement is confirmed:
/// ```text
/// start ──► begin_polling ──► (settlement) ──► submit_order ──► Done
/// ```
/// All methods take `&self`; share the session behind an `Arc` to cancel it
/// from another task while it is polling. Locks are never held across
/// gateway or order backend calls.
pub struct PaymentSession<G, O, D>
where
    G: PaymentGateway,
    O: OrderBackend,
    D: DraftStore,
{
    gateway: G,
    orders: O,
    drafts: D,
    config: SessionConfig,
    instance: RwLock<SessionInstance>,
    draft: RwLock<Option<PendingOrderDraft>>,
    cancel: watch::Sender<bool>,
}

impl<G, O, D> PaymentSession<G, O, D>
where
    G: PaymentGateway,
    O: OrderBackend,
    D: DraftStore,
{
    /// Opens a new session in the `Idle` state.
    pub fn new(gateway: G, orders: O, drafts: D, config: SessionConfig) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            gateway,
            orders,
            drafts,
            config,
            instance: RwLock::new(SessionInstance::default()),
            draft: RwLock::new(None),
            cancel,
        }
    }

    /// Returns the current state.
    pub async fn state(&self) -> SessionState {
        self.instance.read().await.state()
    }

    /// Returns a copy of the session as it is now.
    pub async fn snapshot(&self) -> SessionInstance {
        self.instance.read().await.clone()
    }

    /// Saves `draft` as the pending order and requests a link for its total.
    ///
    /// Overwrites any previously stored draft: a new checkout always reflects
    /// the customer's latest intent.
    #[tracing::instrument(skip(self, draft, metadata), fields(draft_id = %draft.draft_id))]
    pub async fn begin_checkout(
        &self,
        draft: PendingOrderDraft,
        mut metadata: BTreeMap<String, String>,
    ) -> Result<PaymentLink, SagaError> {
        draft
            .validate()
            .map_err(|e| SagaError::InvalidRequest(e.to_string()))?;
        let state = self.state().await;
        if state != SessionState::Idle {
            return Err(SagaError::InvalidState {
                expected: SessionState::Idle.to_string(),
                actual: state,
            });
        }

        self.drafts.save(&draft).await?;
        metadata
            .entry("draft_id".to_string())
            .or_insert_with(|| draft.draft_id.to_string());
        metadata
            .entry("restaurant_id".to_string())
            .or_insert_with(|| draft.restaurant_id.clone());

        let amount = draft.total();
        let contact = draft.payer_contact.clone();
        *self.draft.write().await = Some(draft);

        self.start(amount, &contact, metadata).await
    }

    /// Requests a payment link from the gateway.
    ///
    /// Fails without changing state if `amount` is not positive or the
    /// contact is blank. A link for any amount other than the one requested
    /// is treated as a gateway failure.
    #[tracing::instrument(skip(self, payer_contact, metadata))]
    pub async fn start(
        &self,
        amount: Money,
        payer_contact: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<PaymentLink, SagaError> {
        if !amount.is_positive() {
            return Err(SagaError::InvalidRequest(format!(
                "amount must be positive, got {amount}"
            )));
        }
        let contact = payer_contact.trim();
        if contact.is_empty() {
            return Err(SagaError::InvalidRequest(
                "payer contact is required".to_string(),
            ));
        }

        {
            let mut instance = self.instance.write().await;
            apply_event(&mut instance, SessionEvent::LinkRequested { amount })?;
        }
        metrics::counter!("payment_sessions_started_total").increment(1);

        let request = CreateLinkRequest::new(amount, contact).with_metadata(metadata);
        let result = match tokio::time::timeout(
            self.config.query_timeout,
            self.gateway.create_link(&request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(self.config.query_timeout)),
        }
        .and_then(|link| {
            if link.amount == amount {
                Ok(link)
            } else {
                Err(GatewayError::AmountMismatch {
                    requested: amount,
                    actual: link.amount,
                })
            }
        });

        let mut instance = self.instance.write().await;
        match result {
            Ok(link) => {
                apply_event(
                    &mut instance,
                    SessionEvent::LinkCreated { link: link.clone() },
                )?;
                Ok(link)
            }
            Err(e) => {
                apply_event(
                    &mut instance,
                    SessionEvent::LinkFailed {
                        reason: e.to_string(),
                    },
                )?;
                Err(e.into())
            }
        }
    }

    /// Enters `Awaiting` and polls until the payment settles, the wait bound
    /// elapses, or the session is cancelled.
    ///
    /// A confirmed settlement is followed immediately by order submission.
    /// Returns the terminal state reached; failed status queries along the way
    /// are logged and retried on the next tick.
    #[tracing::instrument(skip(self))]
    pub async fn begin_polling(&self) -> Result<SessionState, SagaError> {
        let mut cancel_rx = self.cancel.subscribe();
        let link = {
            let mut instance = self.instance.write().await;
            let link = instance
                .link()
                .cloned()
                .ok_or_else(|| SagaError::InvalidState {
                    expected: SessionState::Ready.to_string(),
                    actual: instance.state(),
                })?;
            apply_event(&mut instance, SessionEvent::PollingStarted)?;
            link
        };

        let waited = tokio::time::Instant::now();
        let end = self.wait_for_settlement(&link, &mut cancel_rx).await;
        metrics::histogram!("payment_wait_seconds").record(waited.elapsed().as_secs_f64());

        match end {
            PollEnd::Paid(outcome) => self.submit_after_payment(outcome).await,
            PollEnd::TimedOut(reason) => {
                let mut instance = self.instance.write().await;
                apply_event(&mut instance, SessionEvent::TimedOut { reason })
            }
            PollEnd::Cancelled => {
                let mut instance = self.instance.write().await;
                apply_event(&mut instance, SessionEvent::Cancelled)
            }
            PollEnd::Left(state) => Ok(state),
        }
    }

    async fn wait_for_settlement(
        &self,
        link: &PaymentLink,
        cancel_rx: &mut watch::Receiver<bool>,
    ) -> PollEnd {
        let ticks = poller::status_ticks(
            &self.gateway,
            link.link_id.clone(),
            self.config.poll_interval,
            self.config.query_timeout,
        );
        tokio::pin!(ticks);
        let deadline = tokio::time::sleep(self.config.payment_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                changed = cancel_rx.changed() => {
                    if changed.is_err() || *cancel_rx.borrow() {
                        return PollEnd::Cancelled;
                    }
                }
                () = &mut deadline => {
                    return PollEnd::TimedOut(format!(
                        "no settlement within {:?}",
                        self.config.payment_timeout
                    ));
                }
                Some(tick) = ticks.next() => {
                    match tick {
                        SettlementStatus::QueryFailed(e) => {
                            tracing::warn!(link_id = %link.link_id, error = %e, "status query failed, retrying next tick");
                        }
                        SettlementStatus::Unsettled(outcome)
                            if outcome.status == LinkStatus::Expired =>
                        {
                            return PollEnd::TimedOut("payment link expired".to_string());
                        }
                        SettlementStatus::Paid(outcome) | SettlementStatus::Unsettled(outcome) => {
                            self.on_settlement_detected(outcome).await;
                        }
                    }
                    if let Some(end) = self.poll_end().await {
                        return end;
                    }
                }
            }
        }
    }

    async fn poll_end(&self) -> Option<PollEnd> {
        let instance = self.instance.read().await;
        match instance.state() {
            SessionState::Awaiting => None,
            SessionState::Paid => instance.outcome().cloned().map(PollEnd::Paid),
            other => Some(PollEnd::Left(other)),
        }
    }

    /// Moves `Awaiting` to `Paid` if `outcome` proves the link was paid in full.
    ///
    /// Requires a positive amount, at least one settlement record, the
    /// session's own link, and no less than the link amount. Anything else is
    /// ignored and the session keeps waiting. Returns true on transition.
    pub async fn on_settlement_detected(&self, outcome: PaymentOutcome) -> bool {
        let mut instance = self.instance.write().await;
        if instance.state() != SessionState::Awaiting {
            return false;
        }
        let Some((link_id, amount)) = instance.link().map(|l| (l.link_id.clone(), l.amount))
        else {
            return false;
        };

        if outcome.link_id != link_id || !outcome.has_settlement_evidence() {
            return false;
        }
        if outcome.amount_paid < amount {
            tracing::debug!(%link_id, paid = %outcome.amount_paid, %amount, "partial payment ignored");
            return false;
        }

        apply_event(&mut instance, SessionEvent::SettlementConfirmed { outcome }).is_ok()
    }

    async fn submit_after_payment(
        &self,
        outcome: PaymentOutcome,
    ) -> Result<SessionState, SagaError> {
        let remembered = self.draft.read().await.clone();
        let draft = match remembered {
            Some(draft) => Ok(draft),
            None => self
                .drafts
                .load()
                .await
                .map_err(SagaError::from)
                .and_then(|d| d.ok_or(SagaError::NoPendingOrder)),
        };

        match draft {
            Ok(draft) => {
                if let Err(e) = self.submit_order(&draft, &outcome).await {
                    tracing::error!(
                        link_id = %outcome.link_id,
                        error = %e,
                        "payment settled but order creation failed"
                    );
                }
            }
            Err(e) => {
                let token = IdempotencyToken::for_link(&outcome.link_id);
                let mut instance = self.instance.write().await;
                apply_event(&mut instance, SessionEvent::SubmissionStarted { token })?;
                apply_event(
                    &mut instance,
                    SessionEvent::SubmissionFailed {
                        reason: e.to_string(),
                    },
                )?;
            }
        }

        Ok(self.state().await)
    }

    /// Submits the order for a confirmed payment.
    ///
    /// The idempotency token comes from the link, or from the draft when the
    /// outcome carries no link. Success clears the draft store and ends in
    /// `Done`; failure ends in `SubmitFailed` and keeps the draft for the
    /// return-flow reconciler.
    #[tracing::instrument(skip(self, draft, outcome), fields(draft_id = %draft.draft_id, link_id = %outcome.link_id))]
    pub async fn submit_order(
        &self,
        draft: &PendingOrderDraft,
        outcome: &PaymentOutcome,
    ) -> Result<ReconciledOrder, SagaError> {
        let link_id = Some(&outcome.link_id).filter(|id| !id.as_str().trim().is_empty());
        let token = submission::token_for(draft, link_id);
        {
            let mut instance = self.instance.write().await;
            apply_event(
                &mut instance,
                SessionEvent::SubmissionStarted {
                    token: token.clone(),
                },
            )?;
        }

        let result =
            submission::submit_and_clear(&self.orders, &self.drafts, draft, &token, link_id).await;

        let mut instance = self.instance.write().await;
        match result {
            Ok(order) => {
                apply_event(
                    &mut instance,
                    SessionEvent::OrderConfirmed {
                        order: order.clone(),
                    },
                )?;
                Ok(order)
            }
            Err(e) => {
                apply_event(
                    &mut instance,
                    SessionEvent::SubmissionFailed {
                        reason: e.to_string(),
                    },
                )?;
                Err(e.into())
            }
        }
    }

    /// Closes the session.
    ///
    /// A `Ready` session is cancelled at once. An `Awaiting` session stops
    /// polling and ends `Cancelled` once the poll loop observes the request.
    /// Other states are left alone. Returns the state after the call.
    pub async fn cancel(&self) -> SessionState {
        let mut instance = self.instance.write().await;
        match instance.state() {
            SessionState::Ready => {
                if let Err(e) = apply_event(&mut instance, SessionEvent::Cancelled) {
                    tracing::warn!(error = %e, "cancel rejected");
                }
            }
            SessionState::Awaiting => {
                self.cancel.send_replace(true);
            }
            _ => {}
        }
        instance.state()
    }
}

/// Applies `event`, logging the transition and counting terminal states.
fn apply_event(
    instance: &mut SessionInstance,
    event: SessionEvent,
) -> Result<SessionState, SagaError> {
    let event_type = event.event_type();
    let from = instance.transition(event)?;
    let to = instance.state();
    tracing::info!(
        %from,
        %to,
        event = event_type,
        link_id = instance.link().map(|l| l.link_id.as_str()).unwrap_or("-"),
        "session transition"
    );
    if to.is_terminal() {
        metrics::counter!("payment_sessions_terminal_total", "state" => to.as_str()).increment(1);
    }
    Ok(to)
}
