//! HTTP clients for the payment gateway and the order backend.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    CreateLinkRequest, IdempotencyToken, LinkId, LinkStatus, Money, PaymentLink, PaymentOutcome,
    PendingOrderDraft, ReconciledOrder, SettlementRecord,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{GatewayError, OrderError};
use crate::services::gateway::PaymentGateway;
use crate::services::orders::OrderBackend;

/// Header carrying the idempotency token on order creation.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

fn build_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder().timeout(timeout).build()
}

fn join(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}

/// JSON-over-HTTP payment gateway client.
///
/// - `POST {base}/payment-links` creates a link
/// - `GET {base}/payment-links/{id}` reads its status
#[derive(Debug, Clone)]
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpPaymentGateway {
    /// Creates a client whose every request is bounded by `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let client =
            build_client(timeout).map_err(|e| GatewayError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            timeout,
        })
    }

    fn map_send_error(&self, e: reqwest::Error) -> GatewayError {
        if e.is_timeout() {
            GatewayError::Timeout(self.timeout)
        } else {
            GatewayError::Unavailable(e.to_string())
        }
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))
    }
}

#[derive(Deserialize)]
struct StatusResponse {
    status: LinkStatus,
    amount_paid: Money,
    #[serde(default)]
    settlement_records: Vec<SettlementRecord>,
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self, request), fields(amount = %request.amount))]
    async fn create_link(&self, request: &CreateLinkRequest) -> Result<PaymentLink, GatewayError> {
        let response = self
            .client
            .post(join(&self.base_url, "payment-links"))
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let link: PaymentLink = self.read_json(response).await?;
        tracing::info!(link_id = %link.link_id, "payment link created");
        Ok(link)
    }

    #[instrument(skip(self, link_id), fields(%link_id))]
    async fn status(&self, link_id: &LinkId) -> Result<PaymentOutcome, GatewayError> {
        let response = self
            .client
            .get(join(&self.base_url, &format!("payment-links/{link_id}")))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let body: StatusResponse = self.read_json(response).await?;
        Ok(PaymentOutcome {
            link_id: link_id.clone(),
            status: body.status,
            amount_paid: body.amount_paid,
            settlement_records: body.settlement_records,
        })
    }
}

/// JSON-over-HTTP order backend client.
///
/// `POST {base}/orders` with the token in the `Idempotency-Key` header.
#[derive(Debug, Clone)]
pub struct HttpOrderBackend {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpOrderBackend {
    /// Creates a client whose every request is bounded by `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, OrderError> {
        let client = build_client(timeout).map_err(|e| OrderError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            timeout,
        })
    }
}

#[derive(Serialize)]
struct CreateOrderBody<'a> {
    draft: &'a PendingOrderDraft,
    idempotency_token: &'a IdempotencyToken,
    #[serde(skip_serializing_if = "Option::is_none")]
    link_id: Option<&'a LinkId>,
}

#[derive(Deserialize)]
struct CreateOrderResponse {
    order_number: String,
    status: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    link_id: Option<LinkId>,
}

#[async_trait]
impl OrderBackend for HttpOrderBackend {
    #[instrument(skip(self, draft, token, link_id), fields(draft_id = %draft.draft_id, %token))]
    async fn create_order(
        &self,
        draft: &PendingOrderDraft,
        token: &IdempotencyToken,
        link_id: Option<&LinkId>,
    ) -> Result<ReconciledOrder, OrderError> {
        let response = self
            .client
            .post(join(&self.base_url, "orders"))
            .header(IDEMPOTENCY_HEADER, token.as_str())
            .json(&CreateOrderBody {
                draft,
                idempotency_token: token,
                link_id,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OrderError::Timeout(self.timeout)
                } else {
                    OrderError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OrderError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body: CreateOrderResponse = response
            .json()
            .await
            .map_err(|e| OrderError::InvalidResponse(e.to_string()))?;

        Ok(ReconciledOrder {
            order_number: body.order_number,
            status: body.status,
            created_at: body.created_at,
            link_id: body.link_id.or_else(|| link_id.cloned()),
            idempotency_token: token.clone(),
        })
    }
}
