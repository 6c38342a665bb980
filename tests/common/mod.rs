//! Test harness: in-memory SQLite application state plus a scripted PIX
//! gateway standing in for the external payment provider.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request},
    response::Response,
    Router,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use pixcheckout_api::{
    auth::AuthService,
    config::{AppConfig, CheckoutConfig, CommissionConfig, GatewayConfig},
    db,
    entities::{coupon, coupon::CouponKind, merchant_settings, product},
    events,
    gateway::{
        ChargeHandle, ChargeStatusSnapshot, CreateChargeRequest, GatewayError, PaymentStatus,
        PixGateway,
    },
    handlers::AppServices,
    AppState,
};

/// Scripted gateway: per-call queues for charge creation and status polls.
/// An empty status queue answers `WAITING_PAYMENT`.
pub struct MockGateway {
    create_queue: Mutex<VecDeque<Result<ChargeHandle, GatewayError>>>,
    status_queue: Mutex<VecDeque<Result<ChargeStatusSnapshot, GatewayError>>>,
    pub create_count: AtomicUsize,
    pub poll_count: AtomicUsize,
    pub last_create: Mutex<Option<CreateChargeRequest>>,
    sequence: AtomicUsize,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            create_queue: Mutex::new(VecDeque::new()),
            status_queue: Mutex::new(VecDeque::new()),
            create_count: AtomicUsize::new(0),
            poll_count: AtomicUsize::new(0),
            last_create: Mutex::new(None),
            sequence: AtomicUsize::new(0),
        }
    }

    pub fn push_create_failure(&self, message: &str) {
        self.create_queue
            .lock()
            .unwrap()
            .push_back(Err(GatewayError::Remote {
                status: 422,
                message: message.to_string(),
            }));
    }

    pub fn push_status(&self, status: PaymentStatus) {
        self.status_queue
            .lock()
            .unwrap()
            .push_back(Ok(ChargeStatusSnapshot {
                paid_at: matches!(status, PaymentStatus::Paid).then(Utc::now),
                status,
            }));
    }

    pub fn push_status_failure(&self, message: &str) {
        self.status_queue
            .lock()
            .unwrap()
            .push_back(Err(GatewayError::InvalidResponse(message.to_string())));
    }

    pub fn polls(&self) -> usize {
        self.poll_count.load(Ordering::SeqCst)
    }

    pub fn creates(&self) -> usize {
        self.create_count.load(Ordering::SeqCst)
    }

    pub fn last_create_request(&self) -> Option<CreateChargeRequest> {
        self.last_create.lock().unwrap().clone()
    }
}

#[async_trait]
impl PixGateway for MockGateway {
    async fn create_charge(
        &self,
        request: &CreateChargeRequest,
    ) -> Result<ChargeHandle, GatewayError> {
        self.create_count.fetch_add(1, Ordering::SeqCst);
        *self.last_create.lock().unwrap() = Some(request.clone());

        if let Some(scripted) = self.create_queue.lock().unwrap().pop_front() {
            return scripted;
        }
        let n = self.sequence.fetch_add(1, Ordering::SeqCst);
        Ok(ChargeHandle {
            id: format!("ch_test_{}", n),
            qr_code: format!("00020126pix-copy-paste-{}", n),
            qr_code_image_base64: Some("aW1hZ2U=".to_string()),
            status: PaymentStatus::WaitingPayment,
        })
    }

    async fn get_charge_status(
        &self,
        _charge_id: &str,
        _owner_id: Uuid,
    ) -> Result<ChargeStatusSnapshot, GatewayError> {
        self.poll_count.fetch_add(1, Ordering::SeqCst);
        self.status_queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(ChargeStatusSnapshot {
                status: PaymentStatus::WaitingPayment,
                paid_at: None,
            }))
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub gateway: Arc<MockGateway>,
    pub owner_id: Uuid,
    pub token: String,
}

#[allow(dead_code)]
impl TestApp {
    pub async fn new() -> Self {
        Self::with_checkout_config(CheckoutConfig {
            poll_interval_ms: 25,
            poll_timeout_ms: 500,
            abandoned_cart_delay_ms: 400,
        })
        .await
    }

    pub async fn with_checkout_config(checkout: CheckoutConfig) -> Self {
        let cfg = AppConfig {
            database_url: "sqlite::memory:".to_string(),
            jwt_secret: "test_secret_key_for_testing_purposes_only".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            environment: "test".to_string(),
            log_level: "warn".to_string(),
            log_json: false,
            auto_migrate: true,
            db_max_connections: 1,
            db_min_connections: 1,
            settings_cache_ttl_secs: 300,
            gateway: GatewayConfig {
                base_url: "http://gateway.invalid".to_string(),
                api_key: "test-api-key".to_string(),
                request_timeout_secs: 2,
            },
            checkout,
            commission: CommissionConfig {
                percentage_basis_points: 499,
                fixed_fee_cents: 100,
            },
        };

        let pool = db::establish_connection(&cfg).await.expect("database");
        db::run_migrations(&pool).await.expect("migrations");
        let db = Arc::new(pool);

        let (event_sender, event_rx) = events::channel(256);
        tokio::spawn(events::process_events(event_rx));

        let gateway = Arc::new(MockGateway::new());
        let services = AppServices::new(
            db.clone(),
            event_sender.clone(),
            gateway.clone(),
            &cfg,
        );
        let auth = Arc::new(AuthService::new(&cfg.jwt_secret, Duration::from_secs(3600)));

        let owner_id = Uuid::new_v4();
        let token = auth.issue_token(owner_id).expect("token");

        let state = AppState {
            db,
            config: cfg,
            event_sender,
            auth,
            services,
        };
        let router = pixcheckout_api::app(state.clone());

        Self {
            router,
            state,
            gateway,
            owner_id,
            token,
        }
    }

    pub async fn seed_product(&self, slug: &str, price_cents: i64) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            owner_id: Set(self.owner_id),
            slug: Set(slug.to_string()),
            name: Set(format!("Product {}", slug)),
            price_cents: Set(price_cents),
            delivery_url: Set(Some(format!("https://content.example.com/{}", slug))),
            bump_product_id: Set(None),
            bump_price_cents: Set(None),
            upsell_product_id: Set(None),
            upsell_price_cents: Set(None),
            active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product")
    }

    pub async fn attach_bump(
        &self,
        product_id: Uuid,
        bump_product_id: Uuid,
        override_price_cents: Option<i64>,
    ) {
        let mut active = product::ActiveModel {
            id: Set(product_id),
            ..Default::default()
        };
        active.bump_product_id = Set(Some(bump_product_id));
        active.bump_price_cents = Set(override_price_cents);
        active.update(&*self.state.db).await.expect("attach bump");
    }

    pub async fn attach_upsell(
        &self,
        product_id: Uuid,
        upsell_product_id: Uuid,
        override_price_cents: Option<i64>,
    ) {
        let mut active = product::ActiveModel {
            id: Set(product_id),
            ..Default::default()
        };
        active.upsell_product_id = Set(Some(upsell_product_id));
        active.upsell_price_cents = Set(override_price_cents);
        active.update(&*self.state.db).await.expect("attach upsell");
    }

    pub async fn seed_coupon(
        &self,
        product_id: Uuid,
        code: &str,
        kind: CouponKind,
        value: i64,
        automatic: bool,
    ) -> coupon::Model {
        let now = Utc::now();
        coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            code: Set(code.to_string()),
            kind: Set(kind),
            value: Set(value),
            active: Set(true),
            automatic: Set(automatic),
            max_uses: Set(None),
            used_count: Set(0),
            expires_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed coupon")
    }

    pub async fn seed_settings_with_tracking(&self, url: &str, token: &str) {
        let now = Utc::now();
        merchant_settings::ActiveModel {
            id: Set(Uuid::new_v4()),
            owner_id: Set(self.owner_id),
            commission_percent: Set(rust_decimal::Decimal::new(499, 4)),
            fixed_fee_cents: Set(100),
            tracking_webhook_url: Set(Some(url.to_string())),
            tracking_webhook_token: Set(Some(token.to_string())),
            tracking_enabled: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed settings");
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn request_authenticated(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token));
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Opens a session for `slug` and returns its id.
    pub async fn open_session(&self, slug: &str, query: &str) -> Value {
        let uri = if query.is_empty() {
            format!("/api/v1/checkout/{}/sessions", slug)
        } else {
            format!("/api/v1/checkout/{}/sessions?{}", slug, query)
        };
        let response = self.request(Method::POST, &uri, None).await;
        assert_eq!(response.status(), 201, "open session");
        response_json(response).await
    }

    pub async fn fill_buyer(&self, session_id: &str) {
        let response = self
            .request(
                Method::PATCH,
                &format!("/api/v1/checkout/sessions/{}/buyer", session_id),
                Some(serde_json::json!({
                    "name": "Maria Souza",
                    "email": "maria@example.com",
                    "whatsapp_number": "(11) 99999-0000",
                    "country_code": "55"
                })),
            )
            .await;
        assert_eq!(response.status(), 200, "fill buyer");
    }

    pub async fn session_view(&self, session_id: &str) -> Value {
        let response = self
            .request(
                Method::GET,
                &format!("/api/v1/checkout/sessions/{}", session_id),
                None,
            )
            .await;
        assert_eq!(response.status(), 200, "session view");
        response_json(response).await
    }

    /// Polls the session until it reaches `phase` or the deadline passes.
    pub async fn wait_for_phase(&self, session_id: &str, phase: &str, deadline: Duration) -> Value {
        let started = std::time::Instant::now();
        loop {
            let view = self.session_view(session_id).await;
            if view["data"]["phase"] == phase {
                return view;
            }
            if started.elapsed() > deadline {
                panic!(
                    "session {} never reached {}; last view: {}",
                    session_id, phase, view
                );
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Polls the upsell cycle until it reaches `phase`.
    pub async fn wait_for_upsell_phase(
        &self,
        cycle_id: &str,
        phase: &str,
        deadline: Duration,
    ) -> Value {
        let started = std::time::Instant::now();
        loop {
            let response = self
                .request(
                    Method::GET,
                    &format!("/api/v1/checkout/upsell/{}", cycle_id),
                    None,
                )
                .await;
            assert_eq!(response.status(), 200, "upsell view");
            let view = response_json(response).await;
            if view["data"]["phase"] == phase {
                return view;
            }
            if started.elapsed() > deadline {
                panic!(
                    "upsell cycle {} never reached {}; last view: {}",
                    cycle_id, phase, view
                );
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
