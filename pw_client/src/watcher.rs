//! Polling for administrator decisions on recharge orders.
//!
//! Orders are decided off-platform by a human, so the client refetches on a
//! fixed interval. A poll only reports the order's status; once it leaves
//! `PENDING` the balance is refetched from the server, never derived from
//! the order.

use paywall::recharge::{OrderId, OrderStatus, RechargeOrder};
use std::sync::Arc;
use std::time::Duration;

use crate::{
    api_client::PaywallApi,
    errors::{ClientError, ClientResult},
    session::SessionContext,
};

/// Default delay between two polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

pub struct OrderWatcher {
    api: Arc<dyn PaywallApi>,
    session: SessionContext,
    interval: Duration,
}

impl OrderWatcher {
    pub fn new(api: Arc<dyn PaywallApi>, session: SessionContext) -> Self {
        Self {
            api,
            session,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Current state of one of the caller's orders
    pub async fn poll_once(&self, order_id: OrderId) -> ClientResult<RechargeOrder> {
        self.api
            .my_orders()
            .await?
            .into_iter()
            .find(|order| order.id == order_id)
            .ok_or_else(|| ClientError::NotFound(format!("order {order_id}")))
    }

    /// Poll until the order is approved or rejected, then reconcile the
    /// session with the server.
    ///
    /// Errors end the wait; the caller decides whether to watch again.
    pub async fn wait_for_decision(&self, order_id: OrderId) -> ClientResult<RechargeOrder> {
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            ticker.tick().await;

            let order = self.poll_once(order_id).await?;
            if order.status == OrderStatus::Pending {
                continue;
            }

            if order.status == OrderStatus::Approved {
                self.session.refresh(self.api.as_ref()).await?;
            }
            return Ok(order);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{StubApi, order, user};
    use paywall::auth::{CurrentUser, UserRole};
    use std::sync::atomic::Ordering;

    fn api_with(polls: Vec<Vec<RechargeOrder>>) -> Arc<StubApi> {
        let api = StubApi::new(CurrentUser {
            user: user(1, UserRole::User, 400),
            unlocked_resource_ids: vec![],
        });
        *api.orders.lock().unwrap() = polls;
        Arc::new(api)
    }

    #[tokio::test]
    async fn test_waits_until_approved_then_refreshes() {
        let api = api_with(vec![
            vec![order(7, OrderStatus::Pending)],
            vec![order(7, OrderStatus::Pending)],
            vec![order(7, OrderStatus::Approved)],
        ]);
        let session = SessionContext::new();
        let watcher =
            OrderWatcher::new(api.clone(), session.clone()).with_interval(Duration::from_millis(5));

        let decided = watcher.wait_for_decision(7).await.unwrap();

        assert_eq!(decided.status, OrderStatus::Approved);
        assert_eq!(session.require().unwrap().points(), 400);
        assert_eq!(api.me_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejection_does_not_refresh() {
        let api = api_with(vec![vec![order(7, OrderStatus::Rejected)]]);
        let session = SessionContext::new();
        let watcher =
            OrderWatcher::new(api.clone(), session.clone()).with_interval(Duration::from_millis(5));

        let decided = watcher.wait_for_decision(7).await.unwrap();
        assert_eq!(decided.status, OrderStatus::Rejected);
        assert_eq!(api.me_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let api = api_with(vec![vec![order(7, OrderStatus::Pending)]]);
        let watcher = OrderWatcher::new(api, SessionContext::new());
        assert!(matches!(
            watcher.poll_once(8).await,
            Err(ClientError::NotFound(_))
        ));
    }
}
