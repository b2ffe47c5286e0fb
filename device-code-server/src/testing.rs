//! Router test harness over the in-memory store

use axum::{
    body::{to_bytes, Body},
    http::{header::{AUTHORIZATION, CONTENT_TYPE}, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use fingerprint_core::logic::device_code::{sign_payload, SIGNATURE_FIELD};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

use crate::config::Config;
use crate::models::{CreateMerchant, Merchant};
use crate::store::{DeviceStore, MemoryStore};
use crate::{create_router, AppState};

pub const MERCHANT_KEY: &str = "mk_test_01";
pub const SECRET: &str = "test-secret-01";
pub const ADMIN_TOKEN: &str = "admin-test-token";
pub const FP_A: &str = "0123456789abcdef0123456789abcdef";
pub const FP_B: &str = "fedcba9876543210fedcba9876543210";

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub merchant: Merchant,
}

pub async fn app() -> TestApp {
    app_with(|_| {}).await
}

pub async fn app_with(configure: impl FnOnce(&mut Config)) -> TestApp {
    let mut config = Config {
        admin_token: ADMIN_TOKEN.to_string(),
        ..Config::default()
    };
    configure(&mut config);

    let store = Arc::new(MemoryStore::new());
    let merchant = store
        .create_merchant(CreateMerchant {
            merchant_key: MERCHANT_KEY.to_string(),
            name: "Test Shop".to_string(),
            api_secret: Some(SECRET.to_string()),
            expires_at: None,
        })
        .await
        .unwrap();

    let state = AppState::new(store.clone(), config);
    TestApp {
        router: create_router(state),
        store,
        merchant,
    }
}

impl TestApp {
    pub fn signed_body(&self, fingerprint_key: &str, components: Value) -> Value {
        let nonce = Uuid::new_v4().simple().to_string();
        self.signed_body_at(fingerprint_key, components, Utc::now().timestamp(), &nonce)
    }

    pub fn signed_body_at(
        &self,
        fingerprint_key: &str,
        components: Value,
        timestamp: i64,
        nonce: &str,
    ) -> Value {
        self.resign(json!({
            "merchantKey": MERCHANT_KEY,
            "fingerprint_key": fingerprint_key,
            "components": components,
            "device_status": {"isOnline": true},
            "timestamp": timestamp,
            "nonce": nonce,
            "user_agent": "Mozilla/5.0 (test)",
            "url": null,
            "referrer": null,
        }))
    }

    pub fn resign(&self, mut body: Value) -> Value {
        if let Some(fields) = body.as_object_mut() {
            fields.remove(SIGNATURE_FIELD);
        }
        let signature = sign_payload(SECRET, &body).unwrap();
        body[SIGNATURE_FIELD] = json!(signature);
        body
    }

    pub async fn report(&self, fingerprint_key: &str, components: Value) -> (StatusCode, Value) {
        let body = self.signed_body(fingerprint_key, components);
        self.post("/device-code/report", body).await
    }

    pub async fn verify(&self, fingerprint_key: &str) -> (StatusCode, Value) {
        let body = json!({"merchantKey": MERCHANT_KEY, "fingerprint_key": fingerprint_key});
        self.post("/device-code/verify", body).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, Some(body), None).await
    }

    pub async fn admin(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.send(method, uri, body, Some(ADMIN_TOKEN)).await
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }
}
