//! Order backend trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use domain::{IdempotencyToken, LinkId, PendingOrderDraft, ReconciledOrder};

use crate::error::OrderError;

/// Client for the order backend.
///
/// The backend is expected to treat a repeated idempotency token as a no-op
/// that returns the order created by the first call.
#[async_trait]
pub trait OrderBackend: Send + Sync {
    /// Creates an order from the draft.
    async fn create_order(
        &self,
        draft: &PendingOrderDraft,
        token: &IdempotencyToken,
        link_id: Option<&LinkId>,
    ) -> Result<ReconciledOrder, OrderError>;
}

#[derive(Debug, Default)]
struct InMemoryOrderState {
    orders: HashMap<IdempotencyToken, ReconciledOrder>,
    next_number: u32,
    fail_on_create: bool,
    calls: usize,
}

/// In-memory order backend for testing.
///
/// Honors the idempotency contract: a repeated token returns the original
/// order without creating another one.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderBackend {
    state: Arc<RwLock<InMemoryOrderState>>,
}

impl InMemoryOrderBackend {
    /// Creates a new in-memory order backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures order creation to fail.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create = fail;
    }

    /// Returns the number of distinct orders created.
    pub fn order_count(&self) -> usize {
        self.state.read().unwrap().orders.len()
    }

    /// Returns the number of create calls received, failed ones included.
    pub fn call_count(&self) -> usize {
        self.state.read().unwrap().calls
    }

    /// Returns the order created under `token`, if any.
    pub fn order_for(&self, token: &IdempotencyToken) -> Option<ReconciledOrder> {
        self.state.read().unwrap().orders.get(token).cloned()
    }
}

#[async_trait]
impl OrderBackend for InMemoryOrderBackend {
    async fn create_order(
        &self,
        _draft: &PendingOrderDraft,
        token: &IdempotencyToken,
        link_id: Option<&LinkId>,
    ) -> Result<ReconciledOrder, OrderError> {
        let mut state = self.state.write().unwrap();
        state.calls += 1;

        if state.fail_on_create {
            return Err(OrderError::Unavailable("order service down".to_string()));
        }

        if let Some(existing) = state.orders.get(token) {
            return Ok(existing.clone());
        }

        state.next_number += 1;
        let order = ReconciledOrder {
            order_number: format!("ORD-{:04}", state.next_number),
            status: "PLACED".to_string(),
            created_at: Utc::now(),
            link_id: link_id.cloned(),
            idempotency_token: token.clone(),
        };
        state.orders.insert(token.clone(), order.clone());
        Ok(order)
    }
}
