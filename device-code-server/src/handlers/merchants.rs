//! Admin merchant handlers

use axum::{extract::State, Json};
use validator::Validate;

use super::Envelope;
use crate::{AppState, AppResult, AppError};
use crate::models::{CreateMerchant, Merchant};

pub async fn list(State(state): State<AppState>) -> AppResult<Json<Envelope<Vec<Merchant>>>> {
    let merchants = state.store.list_merchants().await?;
    Ok(Envelope::ok("ok", merchants))
}

/// Register a merchant; the API secret is write-only
pub async fn create(
    State(state): State<AppState>,
    Json(data): Json<CreateMerchant>,
) -> AppResult<Json<Envelope<Merchant>>> {
    data.validate()
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    let merchant = state.store.create_merchant(data).await?;
    tracing::info!("Merchant {} registered", merchant.merchant_key);
    Ok(Envelope::ok("merchant created", merchant))
}

#[cfg(test)]
mod tests {
    use crate::testing;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_create_and_list() {
        let app = testing::app().await;
        let request = json!({
            "merchant_key": "mk_live_02",
            "name": "Second Shop",
            "api_secret": "a-long-secret",
        });

        let (status, body) = app.admin(Method::POST, "/admin/merchants", Some(request.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["merchant_key"], "mk_live_02");
        assert_eq!(body["data"]["is_active"], true);
        assert!(body["data"].get("api_secret").is_none());

        let (status, _) = app.admin(Method::POST, "/admin/merchants", Some(request)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, body) = app.admin(Method::GET, "/admin/merchants", None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_create_validates() {
        let app = testing::app().await;
        let request = json!({"merchant_key": "mk", "name": ""});
        let (status, body) = app.admin(Method::POST, "/admin/merchants", Some(request)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 400);
    }

    #[tokio::test]
    async fn test_new_merchant_can_report() {
        let app = testing::app().await;
        let request = json!({"merchant_key": "mk_live_03", "name": "Third Shop"});
        app.admin(Method::POST, "/admin/merchants", Some(request)).await;

        // Without an API secret the merchant key signs
        let mut body = app.signed_body(testing::FP_A, json!({}));
        body["merchantKey"] = json!("mk_live_03");
        body.as_object_mut().unwrap().remove("signature");
        let signature = fingerprint_core::logic::device_code::sign_payload("mk_live_03", &body).unwrap();
        body["signature"] = json!(signature);

        let (status, response) = app.post("/device-code/report", body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["data"]["is_new"], true);
    }
}
