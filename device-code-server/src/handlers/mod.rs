//! HTTP handlers

pub mod health;
pub mod device_code;
pub mod devices;
pub mod merchants;

use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;
use std::net::{IpAddr, SocketAddr};

/// Success envelope shared by every JSON route
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub code: u16,
    pub message: String,
    pub data: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            code: 200,
            message: message.into(),
            data,
        })
    }
}

fn header_ip(headers: &HeaderMap, name: &str) -> Option<IpAddr> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse().ok())
}

/// Caller IP: first `X-Forwarded-For` hop, `X-Real-IP`, then the socket peer
///
/// Header values that are not an IP address are ignored.
pub(crate) fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    header_ip(headers, "x-forwarded-for")
        .or_else(|| header_ip(headers, "x-real-ip"))
        .or_else(|| peer.map(|addr| addr.ip()))
        .map(|ip| ip.to_string())
}
