//! End-to-end tests for the payment session and the return-flow reconciler.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use domain::{
    DeliveryTarget, IdempotencyToken, LinkId, LinkStatus, Money, OrderLine, PendingOrderDraft,
};
use draft_store::{DraftStore, InMemoryDraftStore};
use saga::{
    InMemoryOrderBackend, InMemoryPaymentGateway, PaymentSession, ReconcileOutcome,
    ReturnContext, ReturnFlowReconciler, SagaError, SessionConfig, SessionState, UserNotice,
};

type TestSession =
    PaymentSession<InMemoryPaymentGateway, InMemoryOrderBackend, InMemoryDraftStore>;
type TestReconciler =
    ReturnFlowReconciler<InMemoryPaymentGateway, InMemoryOrderBackend, InMemoryDraftStore>;

struct TestHarness {
    gateway: InMemoryPaymentGateway,
    orders: InMemoryOrderBackend,
    drafts: InMemoryDraftStore,
}

impl TestHarness {
    fn new() -> Self {
        Self {
            gateway: InMemoryPaymentGateway::new(),
            orders: InMemoryOrderBackend::new(),
            drafts: InMemoryDraftStore::new(),
        }
    }

    fn session(&self) -> Arc<TestSession> {
        self.session_with(SessionConfig::default())
    }

    fn session_with(&self, config: SessionConfig) -> Arc<TestSession> {
        Arc::new(PaymentSession::new(
            self.gateway.clone(),
            self.orders.clone(),
            self.drafts.clone(),
            config,
        ))
    }

    fn reconciler(&self) -> TestReconciler {
        ReturnFlowReconciler::new(
            self.gateway.clone(),
            self.orders.clone(),
            self.drafts.clone(),
        )
    }
}

fn draft() -> PendingOrderDraft {
    PendingOrderDraft::new(
        "rest-42",
        vec![OrderLine::new(
            "pizza",
            "Margherita",
            1,
            Money::from_cents(500),
        )],
        DeliveryTarget::new("1 Main St"),
        "+15550100",
    )
}

fn short_timeout() -> SessionConfig {
    SessionConfig {
        payment_timeout: Duration::from_secs(30),
        ..SessionConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_happy_path_paid_link_creates_order() {
    let h = TestHarness::new();
    let session = h.session();

    let link = session
        .begin_checkout(draft(), BTreeMap::new())
        .await
        .unwrap();
    assert_eq!(link.link_id, LinkId::new("L1"));
    assert_eq!(link.amount, Money::from_cents(500));
    assert_eq!(session.state().await, SessionState::Ready);

    h.gateway.record_payment(&link.link_id, Money::from_cents(500));
    let end = session.begin_polling().await.unwrap();

    assert_eq!(end, SessionState::Done);
    let token = IdempotencyToken::for_link(&link.link_id);
    assert_eq!(token.as_str(), "link-L1");
    let order = h.orders.order_for(&token).unwrap();
    assert_eq!(order.idempotency_token, token);
    assert_eq!(order.link_id, Some(link.link_id));
    assert_eq!(h.orders.order_count(), 1);
    assert!(!h.drafts.has_draft().await);

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.order(), Some(&order));
    let states: Vec<_> = snapshot.history().iter().map(|t| t.to).collect();
    assert_eq!(
        states,
        vec![
            SessionState::Creating,
            SessionState::Ready,
            SessionState::Awaiting,
            SessionState::Paid,
            SessionState::Submitting,
            SessionState::Done,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_payment_arriving_while_polling() {
    let h = TestHarness::new();
    let session = h.session();
    let link = session
        .begin_checkout(draft(), BTreeMap::new())
        .await
        .unwrap();

    let started = tokio::time::Instant::now();
    let polling = tokio::spawn({
        let session = session.clone();
        async move { session.begin_polling().await }
    });

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(session.state().await, SessionState::Awaiting);
    h.gateway.record_payment(&link.link_id, Money::from_cents(500));

    let end = polling.await.unwrap().unwrap();
    assert_eq!(end, SessionState::Done);
    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(6) && waited < Duration::from_secs(7));
    assert_eq!(h.orders.order_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_polling_times_out_without_payment() {
    let h = TestHarness::new();
    let session = h.session();
    session
        .begin_checkout(draft(), BTreeMap::new())
        .await
        .unwrap();

    let started = tokio::time::Instant::now();
    let end = session.begin_polling().await.unwrap();

    assert_eq!(end, SessionState::TimedOut);
    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(600) && waited < Duration::from_secs(601));
    assert_eq!(h.orders.call_count(), 0);
    assert!(h.drafts.has_draft().await);
    assert!(session.snapshot().await.failure_reason().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_polling() {
    let h = TestHarness::new();
    let session = h.session();
    session
        .begin_checkout(draft(), BTreeMap::new())
        .await
        .unwrap();

    let polling = tokio::spawn({
        let session = session.clone();
        async move { session.begin_polling().await }
    });

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(session.cancel().await, SessionState::Awaiting);

    let end = polling.await.unwrap().unwrap();
    assert_eq!(end, SessionState::Cancelled);
    assert_eq!(session.state().await, SessionState::Cancelled);
    assert_eq!(h.orders.call_count(), 0);

    let queries = h.gateway.status_query_count();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.gateway.status_query_count(), queries);
}

#[tokio::test(start_paused = true)]
async fn test_zero_amount_settlement_never_transitions() {
    let h = TestHarness::new();
    let session = h.session_with(short_timeout());
    let link = session
        .begin_checkout(draft(), BTreeMap::new())
        .await
        .unwrap();

    h.gateway.report_unbacked_amount(&link.link_id, Money::zero());
    let end = session.begin_polling().await.unwrap();

    assert_eq!(end, SessionState::TimedOut);
    assert_eq!(h.orders.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_partial_payment_keeps_waiting() {
    let h = TestHarness::new();
    let session = h.session_with(short_timeout());
    let link = session
        .begin_checkout(draft(), BTreeMap::new())
        .await
        .unwrap();

    h.gateway.record_payment(&link.link_id, Money::from_cents(200));
    let end = session.begin_polling().await.unwrap();

    assert_eq!(end, SessionState::TimedOut);
    assert_eq!(h.orders.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_expired_link_ends_polling() {
    let h = TestHarness::new();
    let session = h.session();
    let link = session
        .begin_checkout(draft(), BTreeMap::new())
        .await
        .unwrap();

    h.gateway.expire(&link.link_id);
    let started = tokio::time::Instant::now();
    let end = session.begin_polling().await.unwrap();

    assert_eq!(end, SessionState::TimedOut);
    assert!(started.elapsed() < Duration::from_secs(600));
}

#[tokio::test(start_paused = true)]
async fn test_failed_queries_are_retried() {
    let h = TestHarness::new();
    let session = h.session();
    let link = session
        .begin_checkout(draft(), BTreeMap::new())
        .await
        .unwrap();
    h.gateway.set_fail_on_status(true);

    let polling = tokio::spawn({
        let session = session.clone();
        async move { session.begin_polling().await }
    });

    tokio::time::sleep(Duration::from_secs(7)).await;
    assert_eq!(session.state().await, SessionState::Awaiting);
    h.gateway.set_fail_on_status(false);
    h.gateway.record_payment(&link.link_id, Money::from_cents(500));

    assert_eq!(polling.await.unwrap().unwrap(), SessionState::Done);
    assert!(h.gateway.status_query_count() >= 4);
}

#[tokio::test(start_paused = true)]
async fn test_submit_failure_keeps_draft_for_return_flow() {
    let h = TestHarness::new();
    let session = h.session();
    let link = session
        .begin_checkout(draft(), BTreeMap::new())
        .await
        .unwrap();
    h.gateway.record_payment(&link.link_id, Money::from_cents(500));
    h.orders.set_fail_on_create(true);

    let end = session.begin_polling().await.unwrap();
    assert_eq!(end, SessionState::SubmitFailed);
    assert!(h.drafts.has_draft().await);
    assert_eq!(h.orders.order_count(), 0);

    h.orders.set_fail_on_create(false);
    let outcome = h
        .reconciler()
        .reconcile(&ReturnContext::with_link(link.link_id.clone()))
        .await
        .unwrap();

    assert!(matches!(outcome, ReconcileOutcome::Completed { .. }));
    let order = outcome.order().unwrap();
    assert_eq!(
        h.orders.order_for(&IdempotencyToken::for_link(&link.link_id)),
        Some(order.clone())
    );
    assert_eq!(h.orders.order_count(), 1);
    assert!(!h.drafts.has_draft().await);
}

#[tokio::test]
async fn test_return_flow_with_failed_query_submits_unverified() {
    let h = TestHarness::new();
    let session = h.session();
    let link = session
        .begin_checkout(draft(), BTreeMap::new())
        .await
        .unwrap();
    h.gateway.set_fail_on_status(true);

    let outcome = h
        .reconciler()
        .reconcile(&ReturnContext::with_link(link.link_id.clone()))
        .await
        .unwrap();

    match &outcome {
        ReconcileOutcome::CompletedUnverified { order, ambiguity } => {
            assert_eq!(ambiguity.link_id, link.link_id);
            assert_eq!(order.link_id, Some(link.link_id.clone()));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(outcome.notice(), UserNotice::None);
    assert!(
        h.orders
            .order_for(&IdempotencyToken::for_link(&link.link_id))
            .is_some()
    );
    assert!(!h.drafts.has_draft().await);
}

#[tokio::test]
async fn test_return_flow_without_draft_is_no_pending_order() {
    let h = TestHarness::new();

    let result = h
        .reconciler()
        .reconcile(&ReturnContext::empty())
        .await;

    assert!(matches!(result, Err(SagaError::NoPendingOrder)));
    assert_eq!(h.orders.call_count(), 0);
    assert_eq!(h.drafts.save_count().await, 0);
    assert!(!h.drafts.has_draft().await);
}

#[tokio::test]
async fn test_return_flow_without_identifier_uses_draft_token() {
    let h = TestHarness::new();
    let draft = draft();
    h.drafts.save(&draft).await.unwrap();

    let outcome = h
        .reconciler()
        .reconcile(&ReturnContext::empty())
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        ReconcileOutcome::CompletedWithoutPayment { .. }
    ));
    let token = IdempotencyToken::for_draft(draft.draft_id);
    assert_eq!(token.as_str(), format!("draft-{}", draft.draft_id));
    let order = h.orders.order_for(&token).unwrap();
    assert_eq!(order.idempotency_token, token);
    assert_eq!(order.link_id, None);
    assert!(!h.drafts.has_draft().await);
}

#[tokio::test]
async fn test_return_flow_unpaid_link_keeps_draft() {
    let h = TestHarness::new();
    let session = h.session();
    let link = session
        .begin_checkout(draft(), BTreeMap::new())
        .await
        .unwrap();

    let outcome = h
        .reconciler()
        .reconcile(&ReturnContext::with_link(link.link_id.clone()))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ReconcileOutcome::PaymentNotCompleted {
            link_id: link.link_id,
            status: LinkStatus::AwaitingPayment,
        }
    );
    assert_eq!(outcome.notice(), UserNotice::SafeToRetry);
    assert_eq!(h.orders.call_count(), 0);
    assert!(h.drafts.has_draft().await);
}

#[tokio::test]
async fn test_return_flow_paid_but_order_failed_needs_support() {
    let h = TestHarness::new();
    let session = h.session();
    let link = session
        .begin_checkout(draft(), BTreeMap::new())
        .await
        .unwrap();
    h.gateway.record_payment(&link.link_id, Money::from_cents(500));
    h.orders.set_fail_on_create(true);

    let outcome = h
        .reconciler()
        .reconcile(&ReturnContext::with_link(link.link_id.clone()))
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        ReconcileOutcome::PaidButOrderFailed { .. }
    ));
    assert_eq!(outcome.notice(), UserNotice::ContactSupport);
    assert!(h.drafts.has_draft().await);
}

#[tokio::test]
async fn test_return_flow_partial_payment_is_unverified() {
    let h = TestHarness::new();
    let session = h.session();
    let link = session
        .begin_checkout(draft(), BTreeMap::new())
        .await
        .unwrap();
    h.gateway.record_payment(&link.link_id, Money::from_cents(200));

    let outcome = h
        .reconciler()
        .reconcile(&ReturnContext::with_link(link.link_id))
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        ReconcileOutcome::CompletedUnverified { .. }
    ));
}

#[tokio::test]
async fn test_return_flow_partial_payment_with_failed_order_needs_support() {
    let h = TestHarness::new();
    let session = h.session();
    let link = session
        .begin_checkout(draft(), BTreeMap::new())
        .await
        .unwrap();
    h.gateway.record_payment(&link.link_id, Money::from_cents(200));
    h.orders.set_fail_on_create(true);

    let outcome = h
        .reconciler()
        .reconcile(&ReturnContext::with_link(link.link_id.clone()))
        .await
        .unwrap();

    assert!(matches!(
        &outcome,
        ReconcileOutcome::PaidButOrderFailed { link_id, .. } if *link_id == link.link_id
    ));
    assert_eq!(outcome.notice(), UserNotice::ContactSupport);
    assert!(!outcome.is_success());
    assert!(h.drafts.has_draft().await);
}

#[tokio::test]
async fn test_return_flow_unbacked_amount_with_failed_order_needs_support() {
    let h = TestHarness::new();
    let session = h.session();
    let link = session
        .begin_checkout(draft(), BTreeMap::new())
        .await
        .unwrap();
    h.gateway
        .report_unbacked_amount(&link.link_id, Money::from_cents(300));
    h.orders.set_fail_on_create(true);

    let outcome = h
        .reconciler()
        .reconcile(&ReturnContext::with_link(link.link_id))
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        ReconcileOutcome::PaidButOrderFailed { .. }
    ));
    assert_eq!(outcome.notice(), UserNotice::ContactSupport);
    assert!(h.drafts.has_draft().await);
}

#[tokio::test]
async fn test_return_flow_failed_query_with_failed_order_is_safe_to_retry() {
    let h = TestHarness::new();
    let session = h.session();
    let link = session
        .begin_checkout(draft(), BTreeMap::new())
        .await
        .unwrap();
    h.gateway.set_fail_on_status(true);
    h.orders.set_fail_on_create(true);

    let outcome = h
        .reconciler()
        .reconcile(&ReturnContext::with_link(link.link_id))
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        ReconcileOutcome::UnverifiedNotCreated { .. }
    ));
    assert_eq!(outcome.notice(), UserNotice::SafeToRetry);
    assert!(h.drafts.has_draft().await);
}

#[tokio::test(start_paused = true)]
async fn test_stale_session_does_not_clear_newer_draft() {
    let h = TestHarness::new();
    let stale = h.session();
    let first = draft();
    let old_link = stale
        .begin_checkout(first.clone(), BTreeMap::new())
        .await
        .unwrap();
    h.gateway
        .record_payment(&old_link.link_id, Money::from_cents(500));

    let current = h.session();
    let second = draft().with_notes("extra cheese");
    current
        .begin_checkout(second.clone(), BTreeMap::new())
        .await
        .unwrap();

    let end = stale.begin_polling().await.unwrap();

    assert_eq!(end, SessionState::Done);
    let order = h
        .orders
        .order_for(&IdempotencyToken::for_link(&old_link.link_id))
        .unwrap();
    assert_eq!(order.link_id, Some(old_link.link_id));
    let stored = h.drafts.load().await.unwrap().unwrap();
    assert_eq!(stored.draft_id, second.draft_id);
}

#[tokio::test]
async fn test_repeated_submission_reuses_order() {
    let h = TestHarness::new();
    let session = h.session();
    let draft = draft();
    let link = session
        .begin_checkout(draft.clone(), BTreeMap::new())
        .await
        .unwrap();
    h.gateway.record_payment(&link.link_id, Money::from_cents(500));

    let first = h
        .reconciler()
        .reconcile(&ReturnContext::with_link(link.link_id.clone()))
        .await
        .unwrap();

    // Draft reappears, e.g. the clear after the first order never landed.
    h.drafts.save(&draft).await.unwrap();
    let second = h
        .reconciler()
        .reconcile(&ReturnContext::with_link(link.link_id.clone()))
        .await
        .unwrap();

    assert_eq!(first.order(), second.order());
    assert_eq!(h.orders.order_count(), 1);
    assert_eq!(h.orders.call_count(), 2);

    let third = h
        .reconciler()
        .reconcile(&ReturnContext::with_link(link.link_id))
        .await;
    assert!(matches!(third, Err(SagaError::NoPendingOrder)));
}

#[tokio::test]
async fn test_new_checkout_overwrites_previous_draft() {
    let h = TestHarness::new();
    let first = draft();
    h.drafts.save(&first).await.unwrap();

    let session = h.session();
    let second = draft().with_notes("extra cheese");
    session
        .begin_checkout(second.clone(), BTreeMap::new())
        .await
        .unwrap();

    let stored = h.drafts.load().await.unwrap().unwrap();
    assert_eq!(stored.draft_id, second.draft_id);
    assert_ne!(stored.draft_id, first.draft_id);
}
