//! Integration tests for pw_client against a live server.
//!
//! Each test binds the real router to an ephemeral port with a fresh
//! in-memory store.

use paywall::{
    auth::RegisterRequest,
    db::MemoryStore,
    recharge::{NewRechargePlan, OrderReview, OrderStatus, PaymentMethod, RechargePlan},
    resources::{NewResource, Resource},
};
use pw_client::{
    api_client::{ApiClient, PaywallApi},
    errors::ClientError,
    payment_session::PaymentSession,
    purchase::{PurchaseCoordinator, PurchaseOutcome},
    session::SessionContext,
    watcher::OrderWatcher,
};
use pw_server::api::{AppState, create_router};
use pw_server::config::RateLimitConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

const PASSWORD: &str = "SecurePass123";

struct TestServer {
    url: String,
    state: AppState,
}

async fn spawn_server() -> TestServer {
    let state = AppState::new(
        Arc::new(MemoryStore::new()),
        "test_pepper_for_testing_only".to_string(),
        "test_secret_key_for_testing_only_0123456789".to_string(),
        100,
        RateLimitConfig {
            per_second: 1_000,
            per_minute: 10_000,
            ..RateLimitConfig::default()
        },
    );
    let app = create_router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestServer {
        url: format!("http://{addr}"),
        state,
    }
}

/// Generate unique username for tests
fn unique_username(prefix: &str) -> String {
    let rand_id: u32 = rand::random();
    format!("{}_{}", prefix, rand_id % 100000)
}

async fn signed_in(server: &TestServer, prefix: &str) -> (Arc<ApiClient>, SessionContext) {
    let api = Arc::new(ApiClient::new(server.url.clone()).unwrap());
    api.register(RegisterRequest {
        username: unique_username(prefix),
        password: PASSWORD.to_string(),
        display_name: String::new(),
        email: None,
    })
    .await
    .unwrap();

    let session = SessionContext::new();
    session.refresh(api.as_ref()).await.unwrap();
    (api, session)
}

async fn admin(server: &TestServer) -> Arc<ApiClient> {
    server
        .state
        .auth_manager
        .ensure_admin("site_admin", PASSWORD)
        .await
        .unwrap();
    let api = Arc::new(ApiClient::new(server.url.clone()).unwrap());
    api.login("site_admin", PASSWORD).await.unwrap();
    api
}

async fn publish(api: &ApiClient, points_required: i64) -> Resource {
    api.create_resource(&NewResource {
        title: "Lifetimes in depth".to_string(),
        description: "A long read".to_string(),
        content: "the secret content".to_string(),
        is_free: false,
        points_required,
    })
    .await
    .unwrap()
}

async fn create_plan(server: &TestServer, wechat: Option<&str>) -> RechargePlan {
    let admin = paywall::auth::Actor {
        user_id: 0,
        role: paywall::auth::UserRole::Admin,
    };
    server
        .state
        .recharge_manager
        .create_plan(
            &admin,
            NewRechargePlan {
                name: "Starter".to_string(),
                plan_type: "basic".to_string(),
                points: 300,
                price: 3000,
                description: None,
                features: None,
                wechat_qr_code: wechat.map(str::to_string),
                alipay_qr_code: None,
                is_active: true,
                is_featured: false,
                order: 0,
            },
        )
        .await
        .unwrap()
}

// ============================================================================
// Network Error Scenario Tests
// ============================================================================

#[tokio::test]
async fn test_connection_refused() {
    let client = ApiClient::new("http://127.0.0.1:19999").unwrap();

    let result = client.login("testuser", "password").await;

    assert!(
        matches!(result, Err(ClientError::Network(_))),
        "Should fail with a network error when the server is not available"
    );
}

#[tokio::test]
async fn test_garbage_token_requires_login() {
    let server = spawn_server().await;
    let api = ApiClient::new(server.url.clone()).unwrap();
    api.set_access_token(Some("not-a-jwt".to_string())).await;

    let session = SessionContext::new();
    let err = session.refresh(&api).await.unwrap_err();

    assert_eq!(err, ClientError::NotAuthenticated);
    assert!(api.access_token().await.is_none());
    assert!(!session.is_authenticated());
}

// ============================================================================
// Session and purchase
// ============================================================================

#[tokio::test]
async fn test_register_grants_reward() {
    let server = spawn_server().await;
    let (_api, session) = signed_in(&server, "reader").await;

    let user = session.require().unwrap();
    assert_eq!(user.points(), 100);
    assert!(user.unlocked.is_empty());
}

#[tokio::test]
async fn test_purchase_flow() {
    let server = spawn_server().await;
    let (author, _) = signed_in(&server, "author").await;
    let resource = publish(&author, 60).await;

    let (api, session) = signed_in(&server, "reader").await;
    let view = api.get_resource(resource.id).await.unwrap();
    assert!(!view.is_unlocked);
    assert!(view.resource.content.is_none());
    assert!(!session.can_view(&view.resource));

    let coordinator = PurchaseCoordinator::new(api.clone(), session.clone());
    let outcome = coordinator.purchase(&view.resource).await.unwrap();
    assert_eq!(
        outcome,
        PurchaseOutcome::Charged {
            balance: 40,
            message: "Purchase successful, 60 points spent".to_string()
        }
    );
    assert!(session.can_view(&view.resource));

    let view = api.get_resource(resource.id).await.unwrap();
    assert!(view.is_purchased_by_user);
    assert_eq!(view.resource.content.as_deref(), Some("the secret content"));

    // Server state agrees with the session
    assert_eq!(api.balance().await.unwrap().balance, 40);
    assert_eq!(session.refresh(api.as_ref()).await.unwrap().points(), 40);
}

#[tokio::test]
async fn test_insufficient_balance_is_caught_locally() {
    let server = spawn_server().await;
    let (author, _) = signed_in(&server, "author").await;
    let resource = publish(&author, 150).await;

    let (api, session) = signed_in(&server, "reader").await;
    let coordinator = PurchaseCoordinator::new(api.clone(), session.clone());
    let err = coordinator.purchase(&resource).await.unwrap_err();

    assert_eq!(
        err,
        ClientError::InsufficientBalance {
            balance: 100,
            required: 150
        }
    );
    assert_eq!(api.balance().await.unwrap().balance, 100);
    assert!(api.transactions(0, 50).await.unwrap().len() == 1);
}

#[tokio::test]
async fn test_server_rejects_stale_insufficient_balance() {
    let server = spawn_server().await;
    let (author, _) = signed_in(&server, "author").await;
    let resource = publish(&author, 150).await;

    let (api, _) = signed_in(&server, "reader").await;
    let err = api.purchase(resource.id).await.unwrap_err();

    assert_eq!(
        err,
        ClientError::InsufficientBalance {
            balance: 100,
            required: 150
        }
    );
}

#[tokio::test]
async fn test_stale_session_treats_conflict_as_unlocked() {
    let server = spawn_server().await;
    let (author, _) = signed_in(&server, "author").await;
    let resource = publish(&author, 60).await;

    let (api, session) = signed_in(&server, "reader").await;
    api.purchase(resource.id).await.unwrap();

    // The session still believes the resource is locked
    assert!(!session.can_view(&resource));
    let coordinator = PurchaseCoordinator::new(api.clone(), session.clone());
    let outcome = coordinator.purchase(&resource).await.unwrap();

    assert_eq!(outcome, PurchaseOutcome::AlreadyUnlocked);
    assert!(session.can_view(&resource));
    assert_eq!(api.balance().await.unwrap().balance, 40);
}

// ============================================================================
// Recharge workflow
// ============================================================================

#[tokio::test]
async fn test_plan_without_qr_code_has_no_session() {
    let server = spawn_server().await;
    create_plan(&server, None).await;
    let (api, _) = signed_in(&server, "reader").await;

    let plans = api.list_plans(false).await.unwrap();
    assert_eq!(plans.len(), 1);
    assert_eq!(
        PaymentSession::open(plans[0].clone()).unwrap_err(),
        ClientError::NoPaymentMethodAvailable
    );
    assert!(api.my_orders().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_approval_credits_after_watch() {
    let server = spawn_server().await;
    create_plan(&server, Some("wechat://pay/starter")).await;
    let (api, session) = signed_in(&server, "reader").await;

    let plan = api.list_plans(false).await.unwrap().remove(0);
    let mut payment = PaymentSession::open(plan).unwrap();
    assert_eq!(payment.methods(), &[PaymentMethod::Wechat]);
    assert_eq!(payment.qr_code(), Some("wechat://pay/starter"));

    let order = payment.confirm_paid(api.as_ref()).await.unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert!(order.order_no.starts_with('R'));
    assert_eq!(payment.close().map(|o| o.id), Some(order.id));

    // Nothing is credited until an administrator decides
    assert_eq!(api.balance().await.unwrap().balance, 100);

    let watcher = OrderWatcher::new(api.clone(), session.clone())
        .with_interval(Duration::from_millis(50));
    let order_id = order.id;
    let admin = admin(&server).await;
    let reviewer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(120)).await;
        admin
            .review_order(
                order_id,
                &OrderReview {
                    status: Some(OrderStatus::Approved),
                    admin_note: None,
                },
            )
            .await
            .unwrap()
    });

    let decided = watcher.wait_for_decision(order_id).await.unwrap();
    let reviewed = reviewer.await.unwrap();

    assert_eq!(decided.status, OrderStatus::Approved);
    assert_eq!(reviewed.status, OrderStatus::Approved);
    let user = session.require().unwrap();
    assert_eq!(user.points(), 400);
    assert_eq!(user.user.total_recharged, 3000);
}

#[tokio::test]
async fn test_review_requires_admin() {
    let server = spawn_server().await;
    create_plan(&server, Some("wechat://pay/starter")).await;
    let (api, _) = signed_in(&server, "reader").await;

    let plan = api.list_plans(false).await.unwrap().remove(0);
    let mut payment = PaymentSession::open(plan).unwrap();
    let order = payment.confirm_paid(api.as_ref()).await.unwrap();

    let err = api
        .review_order(
            order.id,
            &OrderReview {
                status: Some(OrderStatus::Approved),
                admin_note: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Forbidden(_)));
    assert_eq!(api.balance().await.unwrap().balance, 100);
}
