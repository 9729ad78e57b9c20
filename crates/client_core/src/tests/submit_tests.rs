use super::*;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use shared::domain::LineItem;
use storage::{CartStore, MemoryCartStore};
use tokio::{
    net::TcpListener,
    sync::{Notify, Semaphore},
};

#[derive(Debug, Clone)]
struct CapturedOrder {
    authorization: Option<String>,
    body: OrderRequest,
}

#[derive(Clone)]
struct MockOrderApi {
    status: StatusCode,
    body: &'static str,
    orders: Arc<Mutex<Vec<CapturedOrder>>>,
    received: Arc<Notify>,
    release: Option<Arc<Semaphore>>,
}

impl MockOrderApi {
    fn responding(status: StatusCode, body: &'static str) -> Self {
        Self {
            status,
            body,
            orders: Arc::new(Mutex::new(Vec::new())),
            received: Arc::new(Notify::new()),
            release: None,
        }
    }

    /// Requests wait for a release permit before the response is sent.
    fn held_until_released(status: StatusCode) -> (Self, Arc<Semaphore>) {
        let release = Arc::new(Semaphore::new(0));
        let mut api = Self::responding(status, "{}");
        api.release = Some(release.clone());
        (api, release)
    }
}

async fn handle_order(
    State(api): State<MockOrderApi>,
    headers: HeaderMap,
    Json(body): Json<OrderRequest>,
) -> (StatusCode, String) {
    let authorization = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    api.orders
        .lock()
        .await
        .push(CapturedOrder { authorization, body });
    api.received.notify_one();
    if let Some(release) = &api.release {
        if let Ok(permit) = release.acquire().await {
            permit.forget();
        }
    }
    (api.status, api.body.to_string())
}

async fn spawn_order_api(api: MockOrderApi) -> String {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = Router::new()
        .route("/api/pedidos", post(handle_order))
        .with_state(api);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}/api")
}

async fn pizza_cart(store: Arc<MemoryCartStore>) -> Arc<Mutex<CartModel>> {
    let mut cart = CartModel::load(store).await;
    cart.add_or_increment("Pizza", 20000).await;
    cart.add_or_increment("Pizza", 20000).await;
    cart.add_or_increment("Soda", 3500).await;
    Arc::new(Mutex::new(cart))
}

fn customer() -> CustomerDetails {
    CustomerDetails::new("Ana Gómez", "3001234567", "Calle 10 # 4-20")
}

fn expected_items() -> Vec<LineItem> {
    vec![
        LineItem {
            product_name: "Pizza".into(),
            unit_price: 20000,
            quantity: 2,
        },
        LineItem {
            product_name: "Soda".into(),
            unit_price: 3500,
            quantity: 1,
        },
    ]
}

#[tokio::test]
async fn missing_credential_fails_before_any_request() {
    let api = MockOrderApi::responding(StatusCode::OK, "{}");
    let orders = api.orders.clone();
    let api_base = spawn_order_api(api).await;
    let store = Arc::new(MemoryCartStore::new());
    let cart = pizza_cart(store.clone()).await;
    let submitter = OrderSubmitter::new(api_base, SubmitPolicy::LockDuringSubmit);

    for credential in [None, Some(""), Some("   ")] {
        let err = submitter
            .submit(&cart, &customer(), credential)
            .await
            .expect_err("must require a credential");
        assert!(matches!(err, SubmitError::Unauthenticated));
    }

    assert!(orders.lock().await.is_empty());
    assert_eq!(cart.lock().await.snapshot(), expected_items());
    assert_eq!(store.load().await, expected_items());
    assert!(!submitter.is_in_flight());
}

#[tokio::test]
async fn successful_submission_sends_snapshot_and_clears_cart() {
    let api = MockOrderApi::responding(StatusCode::CREATED, r#"{"success":true}"#);
    let orders = api.orders.clone();
    let api_base = spawn_order_api(api).await;
    let store = Arc::new(MemoryCartStore::new());
    let cart = pizza_cart(store.clone()).await;
    let submitter = OrderSubmitter::new(format!("{api_base}/"), SubmitPolicy::default());

    let receipt = submitter
        .submit(&cart, &customer(), Some("token-abc"))
        .await
        .expect("submit");

    assert_eq!(receipt.total, 43500);
    assert_eq!(receipt.item_count, 2);
    assert!(!receipt.discarded_edits);
    assert!(cart.lock().await.is_empty());
    assert_eq!(store.read_raw().await.as_deref(), Some("[]"));

    let orders = orders.lock().await;
    assert_eq!(orders.len(), 1);
    let order = &orders[0];
    assert_eq!(order.authorization.as_deref(), Some("Bearer token-abc"));
    assert_eq!(order.body.nombre_cliente, "Ana Gómez");
    assert_eq!(order.body.telefono, "3001234567");
    assert_eq!(order.body.direccion, "Calle 10 # 4-20");
    assert_eq!(order.body.total, 43500);
    assert_eq!(order.body.items().expect("items"), expected_items());
}

#[tokio::test]
async fn server_error_leaves_cart_untouched() {
    let api = MockOrderApi::responding(StatusCode::INTERNAL_SERVER_ERROR, "");
    let api_base = spawn_order_api(api).await;
    let store = Arc::new(MemoryCartStore::new());
    let cart = pizza_cart(store.clone()).await;
    let submitter = OrderSubmitter::new(api_base, SubmitPolicy::default());
    let persisted_before = store.read_raw().await;

    let err = submitter
        .submit(&cart, &customer(), Some("token-abc"))
        .await
        .expect_err("must fail");

    assert_eq!(err.status(), Some(500));
    assert_eq!(err.error_code(), Some(ErrorCode::Internal));
    assert_eq!(cart.lock().await.snapshot(), expected_items());
    assert_eq!(store.read_raw().await, persisted_before);
    assert!(!submitter.is_in_flight());
}

#[tokio::test]
async fn rejection_message_comes_from_response_envelope() {
    let api = MockOrderApi::responding(
        StatusCode::BAD_REQUEST,
        r#"{"success":false,"message":"Errores de validación","data":{"telefono":"El teléfono debe tener 10 dígitos"}}"#,
    );
    let api_base = spawn_order_api(api).await;
    let cart = pizza_cart(Arc::new(MemoryCartStore::new())).await;
    let submitter = OrderSubmitter::new(api_base, SubmitPolicy::default());

    let err = submitter
        .submit(&cart, &customer(), Some("token-abc"))
        .await
        .expect_err("must fail");
    match err {
        SubmitError::Failed {
            status,
            code,
            message,
        } => {
            assert_eq!(status, Some(400));
            assert_eq!(code, Some(ErrorCode::Validation));
            assert_eq!(message, "Errores de validación");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(cart.lock().await.len(), 2);
}

#[tokio::test]
async fn unreachable_endpoint_is_a_submit_failure() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let cart = pizza_cart(Arc::new(MemoryCartStore::new())).await;
    let submitter = OrderSubmitter::new(format!("http://{addr}/api"), SubmitPolicy::default())
        .with_timeout(Duration::from_secs(2));

    let err = submitter
        .submit(&cart, &customer(), Some("token-abc"))
        .await
        .expect_err("must fail");
    assert!(matches!(err, SubmitError::Failed { status: None, .. }));
    assert_eq!(cart.lock().await.snapshot(), expected_items());
}

#[tokio::test]
async fn request_timeout_is_a_submit_failure() {
    let (api, release) = MockOrderApi::held_until_released(StatusCode::OK);
    let received = api.received.clone();
    let api_base = spawn_order_api(api).await;
    let store = Arc::new(MemoryCartStore::new());
    let cart = pizza_cart(store.clone()).await;
    let persisted_before = store.read_raw().await;
    let submitter = OrderSubmitter::new(api_base, SubmitPolicy::LockDuringSubmit)
        .with_timeout(Duration::from_millis(300));

    let err = submitter
        .submit(&cart, &customer(), Some("token-abc"))
        .await
        .expect_err("must time out");
    received.notified().await;
    release.add_permits(1);

    assert!(matches!(err, SubmitError::Failed { status: None, .. }));
    assert_eq!(err.error_code(), None);
    assert_eq!(cart.lock().await.snapshot(), expected_items());
    assert_eq!(store.read_raw().await, persisted_before);
    assert!(!submitter.is_in_flight());
}

#[tokio::test]
async fn lock_policy_rejects_second_submission_while_first_is_pending() {
    let (api, release) = MockOrderApi::held_until_released(StatusCode::OK);
    let orders = api.orders.clone();
    let received = api.received.clone();
    let api_base = spawn_order_api(api).await;
    let cart = pizza_cart(Arc::new(MemoryCartStore::new())).await;
    let submitter = Arc::new(OrderSubmitter::new(api_base, SubmitPolicy::LockDuringSubmit));

    let first = tokio::spawn({
        let submitter = submitter.clone();
        let cart = cart.clone();
        async move { submitter.submit(&cart, &customer(), Some("token-abc")).await }
    });
    received.notified().await;
    assert!(submitter.is_in_flight());

    let err = submitter
        .submit(&cart, &customer(), Some("token-abc"))
        .await
        .expect_err("second submission must be refused");
    assert!(matches!(err, SubmitError::InFlight));

    release.add_permits(1);
    first.await.expect("join").expect("first submission");
    assert_eq!(orders.lock().await.len(), 1);
    assert!(!submitter.is_in_flight());
    assert!(cart.lock().await.is_empty());
}

#[tokio::test]
async fn allow_policy_lets_concurrent_submissions_race() {
    let (api, release) = MockOrderApi::held_until_released(StatusCode::OK);
    let orders = api.orders.clone();
    let received = api.received.clone();
    let api_base = spawn_order_api(api).await;
    let cart = pizza_cart(Arc::new(MemoryCartStore::new())).await;
    let submitter = Arc::new(OrderSubmitter::new(api_base, SubmitPolicy::Allow));

    let spawn_submit = || {
        let submitter = submitter.clone();
        let cart = cart.clone();
        tokio::spawn(async move { submitter.submit(&cart, &customer(), Some("token-abc")).await })
    };
    let first = spawn_submit();
    received.notified().await;
    let second = spawn_submit();
    received.notified().await;

    assert_eq!(orders.lock().await.len(), 2);
    release.add_permits(2);
    first.await.expect("join").expect("first submission");
    second.await.expect("join").expect("second submission");
    assert!(cart.lock().await.is_empty());
}

#[tokio::test]
async fn cart_stays_editable_while_submission_is_pending() {
    let (api, release) = MockOrderApi::held_until_released(StatusCode::OK);
    let orders = api.orders.clone();
    let received = api.received.clone();
    let api_base = spawn_order_api(api).await;
    let cart = pizza_cart(Arc::new(MemoryCartStore::new())).await;
    let submitter = Arc::new(OrderSubmitter::new(api_base, SubmitPolicy::LockDuringSubmit));

    let pending = tokio::spawn({
        let submitter = submitter.clone();
        let cart = cart.clone();
        async move { submitter.submit(&cart, &customer(), Some("token-abc")).await }
    });
    received.notified().await;

    cart.lock().await.add_or_increment("Arepa", 6000).await;
    assert_eq!(cart.lock().await.len(), 3);

    release.add_permits(1);
    let receipt = pending.await.expect("join").expect("submission");

    // The request carried the snapshot taken before the edit.
    assert_eq!(receipt.total, 43500);
    assert!(receipt.discarded_edits);
    assert_eq!(
        orders.lock().await[0].body.items().expect("items"),
        expected_items()
    );
    assert!(cart.lock().await.is_empty());
}

#[test]
fn policy_parses_from_config_values() {
    assert_eq!("allow".parse::<SubmitPolicy>(), Ok(SubmitPolicy::Allow));
    assert_eq!(" LOCK ".parse::<SubmitPolicy>(), Ok(SubmitPolicy::LockDuringSubmit));
    assert_eq!(
        "lock-during-submit".parse::<SubmitPolicy>(),
        Ok(SubmitPolicy::LockDuringSubmit)
    );
    assert!("sometimes".parse::<SubmitPolicy>().is_err());
    assert_eq!(SubmitPolicy::default().to_string(), "lock");
}
