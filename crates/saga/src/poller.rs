//! Status polling as a stream of ticks.

use std::time::Duration;

use domain::LinkId;
use futures_core::Stream;
use futures_util::stream;
use tokio::time::MissedTickBehavior;

use crate::error::GatewayError;
use crate::services::gateway::PaymentGateway;
use crate::settlement::SettlementStatus;

/// Queries the gateway once, bounded by `timeout`.
///
/// A call that does not finish in time is reported as a failed query.
pub async fn query_status<G>(gateway: &G, link_id: &LinkId, timeout: Duration) -> SettlementStatus
where
    G: PaymentGateway + ?Sized,
{
    match tokio::time::timeout(timeout, gateway.status(link_id)).await {
        Ok(result) => SettlementStatus::classify(result),
        Err(_) => SettlementStatus::QueryFailed(GatewayError::Timeout(timeout)),
    }
}

/// An endless stream of status ticks for `link_id`, one every `interval`.
///
/// The first query runs immediately. Queries never overlap: the next one is
/// issued only after the previous one has completed or timed out. Dropping
/// the stream stops polling; the caller owns deadlines and cancellation.
pub fn status_ticks<'a, G>(
    gateway: &'a G,
    link_id: LinkId,
    interval: Duration,
    query_timeout: Duration,
) -> impl Stream<Item = SettlementStatus> + Send + 'a
where
    G: PaymentGateway + ?Sized,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    stream::unfold(ticker, move |mut ticker| {
        let link_id = link_id.clone();
        async move {
            ticker.tick().await;
            let status = query_status(gateway, &link_id, query_timeout).await;
            Some((status, ticker))
        }
    })
}
