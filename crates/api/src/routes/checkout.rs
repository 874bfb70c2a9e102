//! Checkout, payment and return-flow endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::DraftId;
use domain::{DeliveryTarget, Money, OrderLine, PaymentLink, PendingOrderDraft};
use draft_store::DraftStore;
use saga::{
    OrderBackend, PaymentGateway, PaymentSession, ReconcileOutcome, ReturnContext,
    ReturnFlowReconciler, SagaError, SessionConfig, SessionInstance, SessionState,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
///
/// Holds at most one live payment session; starting a checkout cancels and
/// replaces the previous one.
pub struct AppState<G, O, D>
where
    G: PaymentGateway,
    O: OrderBackend,
    D: DraftStore,
{
    pub gateway: G,
    pub orders: O,
    pub drafts: D,
    pub session_config: SessionConfig,
    pub session: RwLock<Option<Arc<PaymentSession<G, O, D>>>>,
    pub reconciler: ReturnFlowReconciler<G, O, D>,
}

impl<G, O, D> AppState<G, O, D>
where
    G: PaymentGateway + Clone,
    O: OrderBackend + Clone,
    D: DraftStore + Clone,
{
    pub fn new(gateway: G, orders: O, drafts: D, session_config: SessionConfig) -> Self {
        let reconciler = ReturnFlowReconciler::new(gateway.clone(), orders.clone(), drafts.clone())
            .with_query_timeout(session_config.query_timeout);
        Self {
            gateway,
            orders,
            drafts,
            session_config,
            session: RwLock::new(None),
            reconciler,
        }
    }

    fn new_session(&self) -> PaymentSession<G, O, D> {
        PaymentSession::new(
            self.gateway.clone(),
            self.orders.clone(),
            self.drafts.clone(),
            self.session_config,
        )
    }

    async fn current_session(&self) -> Result<Arc<PaymentSession<G, O, D>>, ApiError> {
        self.session
            .read()
            .await
            .clone()
            .ok_or_else(|| ApiError::NotFound("No checkout in progress".to_string()))
    }
}

// -- Request types --

#[derive(Deserialize)]
pub struct CheckoutRequest {
    pub restaurant_id: String,
    pub items: Vec<CheckoutItemRequest>,
    pub delivery_address: String,
    pub delivery_instructions: Option<String>,
    pub payer_contact: String,
    pub notes: Option<String>,
}

#[derive(Deserialize)]
pub struct CheckoutItemRequest {
    pub item_id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

impl CheckoutRequest {
    fn into_draft(self) -> PendingOrderDraft {
        let items = self
            .items
            .into_iter()
            .map(|i| {
                OrderLine::new(
                    i.item_id,
                    i.name,
                    i.quantity,
                    Money::from_cents(i.unit_price_cents),
                )
            })
            .collect();
        let delivery = DeliveryTarget {
            address: self.delivery_address,
            instructions: self.delivery_instructions,
        };
        let draft =
            PendingOrderDraft::new(self.restaurant_id, items, delivery, self.payer_contact);
        match self.notes {
            Some(notes) => draft.with_notes(notes),
            None => draft,
        }
    }
}

// -- Response types --

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub draft_id: DraftId,
    pub link_id: String,
    pub amount_cents: i64,
    pub url: String,
    pub qr_code: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub state: SessionState,
}

impl CheckoutResponse {
    fn new(draft_id: DraftId, link: PaymentLink, state: SessionState) -> Self {
        Self {
            draft_id,
            link_id: link.link_id.to_string(),
            amount_cents: link.amount.cents(),
            url: link.url,
            qr_code: link.qr_code,
            expires_at: link.expires_at,
            state,
        }
    }
}

#[derive(Serialize)]
pub struct PollingResponse {
    pub link_id: String,
    pub poll_interval_secs: u64,
    pub payment_timeout_secs: u64,
}

#[derive(Serialize)]
pub struct TransitionResponse {
    pub from: SessionState,
    pub to: SessionState,
    pub event: String,
    pub at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub state: SessionState,
    pub link_id: Option<String>,
    pub amount_cents: Option<i64>,
    pub url: Option<String>,
    pub amount_paid_cents: Option<i64>,
    pub order_number: Option<String>,
    pub failure_reason: Option<String>,
    pub transitions: Vec<TransitionResponse>,
}

impl From<SessionInstance> for SessionResponse {
    fn from(instance: SessionInstance) -> Self {
        let link = instance.link();
        Self {
            state: instance.state(),
            link_id: link.map(|l| l.link_id.to_string()),
            amount_cents: link.map(|l| l.amount.cents()),
            url: link.map(|l| l.url.clone()),
            amount_paid_cents: instance.outcome().map(|o| o.amount_paid.cents()),
            order_number: instance.order().map(|o| o.order_number.clone()),
            failure_reason: instance.failure_reason().map(str::to_string),
            transitions: instance
                .history()
                .iter()
                .map(|t| TransitionResponse {
                    from: t.from,
                    to: t.to,
                    event: t.event.clone(),
                    at: t.at,
                })
                .collect(),
        }
    }
}

#[derive(Serialize)]
pub struct StateResponse {
    pub state: SessionState,
}

#[derive(Serialize)]
pub struct ReturnResponse {
    pub outcome: &'static str,
    pub success: bool,
    pub notice: &'static str,
    pub message: &'static str,
    pub order_number: Option<String>,
    pub link_id: Option<String>,
    pub detail: Option<String>,
}

impl From<ReconcileOutcome> for ReturnResponse {
    fn from(outcome: ReconcileOutcome) -> Self {
        let notice = outcome.notice();
        let order_number = outcome.order().map(|o| o.order_number.clone());
        let (link_id, detail) = match &outcome {
            ReconcileOutcome::Completed { order } | ReconcileOutcome::CompletedWithoutPayment { order } => {
                (order.link_id.as_ref().map(|l| l.to_string()), None)
            }
            ReconcileOutcome::CompletedUnverified { ambiguity, .. } => {
                (Some(ambiguity.link_id.to_string()), Some(ambiguity.reason.clone()))
            }
            ReconcileOutcome::PaidButOrderFailed { link_id, error } => {
                (Some(link_id.to_string()), Some(error.to_string()))
            }
            ReconcileOutcome::UnverifiedNotCreated { ambiguity, error } => (
                Some(ambiguity.link_id.to_string()),
                Some(format!("{}; {error}", ambiguity.reason)),
            ),
            ReconcileOutcome::OrderNotCreated { error } => (None, Some(error.to_string())),
            ReconcileOutcome::PaymentNotCompleted { link_id, status } => {
                (Some(link_id.to_string()), Some(format!("link is {status}")))
            }
        };
        Self {
            outcome: outcome.as_str(),
            success: outcome.is_success(),
            notice: notice.as_str(),
            message: notice.message(),
            order_number,
            link_id,
            detail,
        }
    }
}

// -- Handlers --

/// POST /checkout: save the draft, open a session and create its payment link.
#[tracing::instrument(skip(state, req), fields(restaurant_id = %req.restaurant_id))]
pub async fn start<G, O, D>(
    State(state): State<Arc<AppState<G, O, D>>>,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError>
where
    G: PaymentGateway + Clone + 'static,
    O: OrderBackend + Clone + 'static,
    D: DraftStore + Clone + 'static,
{
    let draft = req.into_draft();
    draft
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let draft_id = draft.draft_id;

    let session = Arc::new(state.new_session());
    let previous = state.session.write().await.replace(session.clone());
    if let Some(previous) = previous {
        let left = previous.cancel().await;
        tracing::info!(state = %left, "previous checkout replaced");
    }

    let link = session.begin_checkout(draft, Default::default()).await?;
    let session_state = session.state().await;
    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse::new(draft_id, link, session_state)),
    ))
}

/// POST /checkout/pay: start polling the current link in the background.
#[tracing::instrument(skip(state))]
pub async fn pay<G, O, D>(
    State(state): State<Arc<AppState<G, O, D>>>,
) -> Result<(StatusCode, Json<PollingResponse>), ApiError>
where
    G: PaymentGateway + Clone + 'static,
    O: OrderBackend + Clone + 'static,
    D: DraftStore + Clone + 'static,
{
    let session = state.current_session().await?;
    let snapshot = session.snapshot().await;
    let link = match (snapshot.state(), snapshot.link()) {
        (SessionState::Ready, Some(link)) => link.clone(),
        (actual, _) => {
            return Err(SagaError::InvalidState {
                expected: SessionState::Ready.to_string(),
                actual,
            }
            .into());
        }
    };

    tokio::spawn(async move {
        match session.begin_polling().await {
            Ok(end) => tracing::info!(state = %end, "payment session finished"),
            Err(e) => tracing::warn!(error = %e, "payment session did not poll"),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(PollingResponse {
            link_id: link.link_id.to_string(),
            poll_interval_secs: state.session_config.poll_interval.as_secs(),
            payment_timeout_secs: state.session_config.payment_timeout.as_secs(),
        }),
    ))
}

/// GET /checkout: snapshot of the current session.
pub async fn status<G, O, D>(
    State(state): State<Arc<AppState<G, O, D>>>,
) -> Result<Json<SessionResponse>, ApiError>
where
    G: PaymentGateway + Clone + 'static,
    O: OrderBackend + Clone + 'static,
    D: DraftStore + Clone + 'static,
{
    let session = state.current_session().await?;
    Ok(Json(session.snapshot().await.into()))
}

/// POST /checkout/cancel: cancel the current session.
#[tracing::instrument(skip(state))]
pub async fn cancel<G, O, D>(
    State(state): State<Arc<AppState<G, O, D>>>,
) -> Result<Json<StateResponse>, ApiError>
where
    G: PaymentGateway + Clone + 'static,
    O: OrderBackend + Clone + 'static,
    D: DraftStore + Clone + 'static,
{
    let session = state.current_session().await?;
    let left = session.cancel().await;
    Ok(Json(StateResponse { state: left }))
}

/// GET /checkout/return: resume after the customer comes back from paying.
#[tracing::instrument(skip(state, params))]
pub async fn return_flow<G, O, D>(
    State(state): State<Arc<AppState<G, O, D>>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<ReturnResponse>, ApiError>
where
    G: PaymentGateway + Clone + 'static,
    O: OrderBackend + Clone + 'static,
    D: DraftStore + Clone + 'static,
{
    let ctx = ReturnContext::from_query(&params);
    let outcome = state.reconciler.reconcile(&ctx).await?;
    Ok(Json(outcome.into()))
}
