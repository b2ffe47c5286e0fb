//! End-to-end: a real server on an ephemeral port driven by the
//! fingerprint-core reporting client.

use device_code_server::models::CreateMerchant;
use device_code_server::store::{DeviceStore, MemoryStore};
use device_code_server::{create_router, AppState, Config};
use fingerprint_core::logic::device_code::{
    MerchantCredentials, ReportConfig, ReportError, ReportingClient,
};
use fingerprint_core::logic::identity::Fingerprint;
use fingerprint_core::logic::signals::{
    DeviceStatus, GeneratedFingerprint, HeadlessProbe, SignalCollector, StableFingerprint,
};
use std::net::SocketAddr;
use std::sync::Arc;

const MERCHANT_KEY: &str = "mk_flow_01";
const SECRET: &str = "flow-secret-01";

async fn spawn_server() -> (SocketAddr, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    store
        .create_merchant(CreateMerchant {
            merchant_key: MERCHANT_KEY.to_string(),
            name: "Flow Shop".to_string(),
            api_secret: Some(SECRET.to_string()),
            expires_at: None,
        })
        .await
        .unwrap();

    let app = create_router(AppState::new(store.clone(), Config::default()));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .unwrap();
    });

    (addr, store)
}

fn client(addr: SocketAddr) -> ReportingClient {
    ReportingClient::new(ReportConfig::new(format!("http://{}", addr))).unwrap()
}

async fn stable_fingerprint() -> StableFingerprint {
    let mut collector =
        SignalCollector::new(HeadlessProbe::fixed("Linux x86_64", 8)).with_merchant_key(MERCHANT_KEY);
    match collector.generate().await {
        GeneratedFingerprint::Stable(stable) => stable,
        GeneratedFingerprint::LowConfidence { reason, .. } => {
            panic!("headless collection fell back: {}", reason)
        }
    }
}

#[tokio::test]
async fn test_report_then_verify() {
    let (addr, store) = spawn_server().await;
    let client = client(addr);
    let credentials = MerchantCredentials::new(MERCHANT_KEY).with_secret(SECRET);
    let fingerprint = stable_fingerprint().await;

    let first = client
        .report(&credentials, &fingerprint, &DeviceStatus::default())
        .await
        .unwrap();
    assert!(first.is_new);
    assert!(first.device_code.starts_with("DEV_"));
    assert_eq!(first.fingerprint, fingerprint.fingerprint);

    let second = client
        .report(&credentials, &fingerprint, &DeviceStatus::default())
        .await
        .unwrap();
    assert!(!second.is_new);
    assert_eq!(second.device_code, first.device_code);

    let verified = client.verify(MERCHANT_KEY, &fingerprint.fingerprint).await.unwrap();
    assert!(verified.valid);
    assert_eq!(verified.device_code, first.device_code);

    // The stored snapshot is the collected signal set, and the peer IP was recorded
    let merchant = store.find_merchant_by_key(MERCHANT_KEY).await.unwrap().unwrap();
    let record = store
        .find_device(merchant.id, fingerprint.fingerprint.as_str())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.components, fingerprint.signals.to_json());
    assert_eq!(record.ip_address.as_deref(), Some("127.0.0.1"));
    tokio_test::assert_ok!(store.device_access_logs(record.id, 10).await);
    assert_eq!(store.access_log_count(), 3);
}

#[tokio::test]
async fn test_unreported_fingerprint_not_found() {
    let (addr, _) = spawn_server().await;
    let unknown = Fingerprint::parse("ffffffffffffffffffffffffffffffff").unwrap();

    let result = client(addr).verify(MERCHANT_KEY, &unknown).await;
    assert!(matches!(result, Err(ReportError::NotFound(_))));
}

#[tokio::test]
async fn test_auth_failures_are_distinct() {
    let (addr, store) = spawn_server().await;
    let client = client(addr);
    let fingerprint = stable_fingerprint().await;

    let wrong_secret = MerchantCredentials::new(MERCHANT_KEY).with_secret("not-the-secret");
    let result = client
        .report(&wrong_secret, &fingerprint, &DeviceStatus::default())
        .await;
    assert!(matches!(result, Err(ReportError::Unauthorized(_))));

    let unknown = MerchantCredentials::new("mk_nobody").with_secret(SECRET);
    let result = client.report(&unknown, &fingerprint, &DeviceStatus::default()).await;
    assert!(matches!(result, Err(ReportError::Forbidden(_))));

    store.set_merchant_active(MERCHANT_KEY, false);
    let valid = MerchantCredentials::new(MERCHANT_KEY).with_secret(SECRET);
    let result = client.report(&valid, &fingerprint, &DeviceStatus::default()).await;
    assert!(matches!(result, Err(ReportError::Forbidden(_))));
}
