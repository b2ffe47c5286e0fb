//! Admin authentication middleware
//!
//! The admin routes share one static bearer token from `ADMIN_TOKEN`. With
//! no token configured every admin request is rejected.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::{AppError, AppState};

/// Middleware: require the admin bearer token
pub async fn require_admin(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !state.config.admin_enabled() {
        return Err(AppError::Unauthorized("admin API disabled".to_string()));
    }

    let token = extract_bearer_token(&req)?;
    if !constant_time_eq(token.as_bytes(), state.config.admin_token.as_bytes()) {
        tracing::warn!("Rejected admin request with invalid token");
        return Err(AppError::Unauthorized("invalid admin token".to_string()));
    }

    Ok(next.run(req).await)
}

/// Extract bearer token from Authorization header
fn extract_bearer_token(req: &Request) -> Result<&str, AppError> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Unauthorized("authentication required".to_string()))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"admin-token", b"admin-token"));
        assert!(!constant_time_eq(b"admin-token", b"admin-tokem"));
        assert!(!constant_time_eq(b"admin", b"admin-token"));
    }

    #[test]
    fn test_bearer_extraction() {
        let req = Request::builder()
            .header(AUTHORIZATION, "Bearer abc")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(extract_bearer_token(&req).unwrap(), "abc");

        let req = Request::builder()
            .header(AUTHORIZATION, "Basic abc")
            .body(axum::body::Body::empty())
            .unwrap();
        assert!(extract_bearer_token(&req).is_err());
    }
}
