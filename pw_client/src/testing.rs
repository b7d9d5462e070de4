//! Fixtures and an in-process [`PaywallApi`] stub for unit tests.

use async_trait::async_trait;
use chrono::Utc;
use paywall::{
    auth::{AuthResponse, CurrentUser, RegisterRequest, User, UserId, UserRole},
    ledger::{AdjustRequest, PointTransaction, PointsBalance},
    recharge::{
        NewRechargeOrder, OrderId, OrderReview, OrderStatus, RechargeOrder, RechargePlan,
    },
    resources::{NewResource, PurchaseResponse, Resource, ResourceId, ResourceView},
};
use std::sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;

use crate::{
    api_client::PaywallApi,
    errors::{ClientError, ClientResult},
};

pub fn user(id: UserId, role: UserRole, points: i64) -> User {
    User {
        id,
        username: format!("user{id}"),
        display_name: format!("User {id}"),
        email: None,
        role,
        points,
        total_recharged: 0,
        is_active: true,
        created_at: Utc::now(),
        last_login: None,
    }
}

pub fn resource(id: ResourceId, author_id: UserId, is_free: bool) -> Resource {
    Resource {
        id,
        title: format!("Resource {id}"),
        description: String::new(),
        content: None,
        author_id,
        is_free,
        points_required: if is_free { 0 } else { 60 },
        created_at: Utc::now(),
    }
}

pub fn plan(wechat: Option<&str>, alipay: Option<&str>) -> RechargePlan {
    RechargePlan {
        id: 1,
        name: "Starter".to_string(),
        plan_type: "basic".to_string(),
        points: 300,
        price: 3000,
        description: None,
        features: None,
        wechat_qr_code: wechat.map(str::to_string),
        alipay_qr_code: alipay.map(str::to_string),
        is_active: true,
        is_featured: false,
        order: 0,
        created_at: Utc::now(),
        updated_at: None,
    }
}

pub fn order(id: OrderId, status: OrderStatus) -> RechargeOrder {
    RechargeOrder {
        id,
        order_no: format!("R20250101000000{id:08X}"),
        user_id: 1,
        plan_id: Some(1),
        amount: 3000,
        points: 300,
        payment_method: paywall::recharge::PaymentMethod::Wechat,
        status,
        payment_proof: None,
        admin_note: None,
        approved_by: None,
        approved_at: None,
        created_at: Utc::now(),
        updated_at: None,
    }
}

/// Scripted server: answers from canned values and counts calls
pub struct StubApi {
    pub current: Mutex<CurrentUser>,
    pub purchase_result: Mutex<ClientResult<PurchaseResponse>>,
    pub order_result: Mutex<ClientResult<RechargeOrder>>,
    pub orders: Mutex<Vec<Vec<RechargeOrder>>>,
    pub delay: Duration,
    pub purchase_calls: AtomicUsize,
    pub order_calls: AtomicUsize,
    pub me_calls: AtomicUsize,
}

impl StubApi {
    pub fn new(current: CurrentUser) -> Self {
        Self {
            current: Mutex::new(current),
            purchase_result: Mutex::new(Err(ClientError::Timeout)),
            order_result: Mutex::new(Err(ClientError::Timeout)),
            orders: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            purchase_calls: AtomicUsize::new(0),
            order_calls: AtomicUsize::new(0),
            me_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn purchases(&self) -> usize {
        self.purchase_calls.load(Ordering::SeqCst)
    }

    pub fn orders_created(&self) -> usize {
        self.order_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaywallApi for StubApi {
    async fn register(&self, _request: RegisterRequest) -> ClientResult<AuthResponse> {
        Err(ClientError::Forbidden("stub".to_string()))
    }

    async fn login(&self, _username: &str, _password: &str) -> ClientResult<AuthResponse> {
        Err(ClientError::Forbidden("stub".to_string()))
    }

    async fn me(&self) -> ClientResult<CurrentUser> {
        self.me_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.current.lock().unwrap().clone())
    }

    async fn balance(&self) -> ClientResult<PointsBalance> {
        let current = self.current.lock().unwrap();
        Ok(PointsBalance {
            user_id: current.user.id,
            balance: current.user.points,
            total_recharged: current.user.total_recharged,
        })
    }

    async fn transactions(&self, _skip: i64, _limit: i64) -> ClientResult<Vec<PointTransaction>> {
        Ok(Vec::new())
    }

    async fn list_plans(&self, _include_inactive: bool) -> ClientResult<Vec<RechargePlan>> {
        Ok(vec![plan(Some("wechat://pay"), None)])
    }

    async fn create_order(&self, _order: &NewRechargeOrder) -> ClientResult<RechargeOrder> {
        self.order_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.order_result.lock().unwrap().clone()
    }

    async fn my_orders(&self) -> ClientResult<Vec<RechargeOrder>> {
        let mut polls = self.orders.lock().unwrap();
        if polls.len() > 1 {
            Ok(polls.remove(0))
        } else {
            Ok(polls.first().cloned().unwrap_or_default())
        }
    }

    async fn review_order(
        &self,
        _order_id: OrderId,
        _review: &OrderReview,
    ) -> ClientResult<RechargeOrder> {
        Err(ClientError::Forbidden("stub".to_string()))
    }

    async fn create_resource(&self, _resource: &NewResource) -> ClientResult<Resource> {
        Err(ClientError::Forbidden("stub".to_string()))
    }

    async fn get_resource(&self, resource_id: ResourceId) -> ClientResult<ResourceView> {
        Err(ClientError::NotFound(format!("resource {resource_id}")))
    }

    async fn purchase(&self, _resource_id: ResourceId) -> ClientResult<PurchaseResponse> {
        self.purchase_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.purchase_result.lock().unwrap().clone()
    }

    async fn admin_adjust(
        &self,
        _user_id: UserId,
        _request: &AdjustRequest,
    ) -> ClientResult<PointTransaction> {
        Err(ClientError::Forbidden("stub".to_string()))
    }
}
