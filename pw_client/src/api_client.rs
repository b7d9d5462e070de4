//! HTTP API client for the paywall server.

use async_trait::async_trait;
use paywall::{
    auth::{AuthResponse, CurrentUser, LoginRequest, RegisterRequest, UserId},
    ledger::{AdjustRequest, PointTransaction, PointsBalance},
    recharge::{NewRechargeOrder, OrderId, OrderReview, RechargeOrder, RechargePlan},
    resources::{NewResource, PurchaseResponse, Resource, ResourceId, ResourceView},
};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{Deserialize, de::DeserializeOwned};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::errors::{ClientError, ClientResult};

/// Default timeout for every HTTP request
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Server operations the client logic depends on
#[async_trait]
pub trait PaywallApi: Send + Sync {
    async fn register(&self, request: RegisterRequest) -> ClientResult<AuthResponse>;
    async fn login(&self, username: &str, password: &str) -> ClientResult<AuthResponse>;
    async fn me(&self) -> ClientResult<CurrentUser>;
    async fn balance(&self) -> ClientResult<PointsBalance>;
    async fn transactions(&self, skip: i64, limit: i64) -> ClientResult<Vec<PointTransaction>>;
    async fn list_plans(&self, include_inactive: bool) -> ClientResult<Vec<RechargePlan>>;
    async fn create_order(&self, order: &NewRechargeOrder) -> ClientResult<RechargeOrder>;
    async fn my_orders(&self) -> ClientResult<Vec<RechargeOrder>>;
    async fn review_order(
        &self,
        order_id: OrderId,
        review: &OrderReview,
    ) -> ClientResult<RechargeOrder>;
    async fn create_resource(&self, resource: &NewResource) -> ClientResult<Resource>;
    async fn get_resource(&self, resource_id: ResourceId) -> ClientResult<ResourceView>;
    async fn purchase(&self, resource_id: ResourceId) -> ClientResult<PurchaseResponse>;
    async fn admin_adjust(
        &self,
        user_id: UserId,
        request: &AdjustRequest,
    ) -> ClientResult<PointTransaction>;
}

/// Error body returned by the server
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    balance: Option<i64>,
    #[serde(default)]
    required: Option<i64>,
}

/// API client for communicating with the paywall server
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
    access_token: RwLock<Option<String>>,
}

impl ApiClient {
    /// Create a new API client with the default timeout
    pub fn new(base_url: impl Into<String>) -> ClientResult<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Create a new API client; requests exceeding `timeout` fail with
    /// [`ClientError::Timeout`]
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            access_token: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Current access token, if any
    pub async fn access_token(&self) -> Option<String> {
        self.access_token.read().await.clone()
    }

    /// Install a token restored from storage
    pub async fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write().await = token;
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
    }

    async fn authorized(&self, method: Method, path: &str) -> ClientResult<RequestBuilder> {
        let token = self
            .access_token()
            .await
            .ok_or(ClientError::NotAuthenticated)?;
        Ok(self.request(method, path).bearer_auth(token))
    }

    /// Send a request and decode a successful JSON body
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> ClientResult<T> {
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body: ErrorBody = response.json().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED {
            // The token is no longer accepted; force a new login
            self.set_access_token(None).await;
        }
        Err(error_from_status(status, body))
    }

    async fn authenticate(&self, request: RequestBuilder) -> ClientResult<AuthResponse> {
        let auth: AuthResponse = self.send(request).await?;
        self.set_access_token(Some(auth.access_token.clone())).await;
        Ok(auth)
    }
}

/// Map a non-success status to the client taxonomy
fn error_from_status(status: StatusCode, body: ErrorBody) -> ClientError {
    let message = if body.error.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("Unknown error")
            .to_string()
    } else {
        body.error
    };

    match status {
        StatusCode::UNAUTHORIZED => ClientError::NotAuthenticated,
        StatusCode::PAYMENT_REQUIRED => match (body.balance, body.required) {
            (Some(balance), Some(required)) => ClientError::InsufficientBalance { balance, required },
            _ => ClientError::PaymentRequired(message),
        },
        StatusCode::FORBIDDEN => ClientError::Forbidden(message),
        StatusCode::NOT_FOUND => ClientError::NotFound(message),
        s if s.is_server_error() => ClientError::ServerError {
            status: s.as_u16(),
            message,
        },
        s => ClientError::Rejected {
            status: s.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl PaywallApi for ApiClient {
    async fn register(&self, request: RegisterRequest) -> ClientResult<AuthResponse> {
        self.authenticate(self.request(Method::POST, "/api/auth/register").json(&request))
            .await
    }

    async fn login(&self, username: &str, password: &str) -> ClientResult<AuthResponse> {
        let request = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        self.authenticate(self.request(Method::POST, "/api/auth/login").json(&request))
            .await
    }

    async fn me(&self) -> ClientResult<CurrentUser> {
        self.send(self.authorized(Method::GET, "/api/auth/me").await?)
            .await
    }

    async fn balance(&self) -> ClientResult<PointsBalance> {
        self.send(self.authorized(Method::GET, "/api/points/balance").await?)
            .await
    }

    async fn transactions(&self, skip: i64, limit: i64) -> ClientResult<Vec<PointTransaction>> {
        let request = self
            .authorized(Method::GET, "/api/points/transactions")
            .await?
            .query(&[("skip", skip), ("limit", limit)]);
        self.send(request).await
    }

    async fn list_plans(&self, include_inactive: bool) -> ClientResult<Vec<RechargePlan>> {
        let request = self
            .request(Method::GET, "/api/recharge/plans")
            .query(&[("include_inactive", include_inactive)]);
        self.send(request).await
    }

    async fn create_order(&self, order: &NewRechargeOrder) -> ClientResult<RechargeOrder> {
        let request = self
            .authorized(Method::POST, "/api/recharge/orders")
            .await?
            .json(order);
        self.send(request).await
    }

    async fn my_orders(&self) -> ClientResult<Vec<RechargeOrder>> {
        self.send(self.authorized(Method::GET, "/api/recharge/orders/my").await?)
            .await
    }

    async fn review_order(
        &self,
        order_id: OrderId,
        review: &OrderReview,
    ) -> ClientResult<RechargeOrder> {
        let request = self
            .authorized(Method::PUT, &format!("/api/recharge/orders/{order_id}"))
            .await?
            .json(review);
        self.send(request).await
    }

    async fn create_resource(&self, resource: &NewResource) -> ClientResult<Resource> {
        let request = self
            .authorized(Method::POST, "/api/resources")
            .await?
            .json(resource);
        self.send(request).await
    }

    async fn get_resource(&self, resource_id: ResourceId) -> ClientResult<ResourceView> {
        let path = format!("/api/resources/{resource_id}");
        let request = match self.access_token().await {
            Some(token) => self.request(Method::GET, &path).bearer_auth(token),
            None => self.request(Method::GET, &path),
        };
        self.send(request).await
    }

    async fn purchase(&self, resource_id: ResourceId) -> ClientResult<PurchaseResponse> {
        let request = self
            .authorized(
                Method::POST,
                &format!("/api/resources/{resource_id}/purchase"),
            )
            .await?;

        match self.send(request).await {
            Err(ClientError::Rejected { status: 409, .. }) => Err(ClientError::AlreadyUnlocked),
            other => other,
        }
    }

    async fn admin_adjust(
        &self,
        user_id: UserId,
        request: &AdjustRequest,
    ) -> ClientResult<PointTransaction> {
        let request = self
            .authorized(Method::POST, "/api/points/admin/adjust")
            .await?
            .query(&[("user_id", user_id)])
            .json(request);
        self.send(request).await
    }
}
