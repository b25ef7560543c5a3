use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::request::Parts,
};
use std::convert::Infallible;
use std::net::SocketAddr;

use crate::error::AppError;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Raw Materials Project key from the `X-API-KEY` header. Never log this.
pub struct ApiKey(pub String);

impl<S> FromRequestParts<S> for ApiKey
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(API_KEY_HEADER)
            .ok_or_else(|| AppError::InvalidApiKey("Missing X-API-KEY header".to_string()))?;

        let key = value
            .to_str()
            .map_err(|_| AppError::InvalidApiKey("Invalid API key format".to_string()))?;

        Ok(Self(key.trim().to_string()))
    }
}

/// Client address, proxy aware: first `X-Forwarded-For` hop, then the peer
/// socket address, then `"unknown"`.
pub struct ClientIp(pub String);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());

        if let Some(ip) = forwarded {
            return Ok(Self(ip.to_string()));
        }

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        Ok(Self(peer.unwrap_or_else(|| "unknown".to_string())))
    }
}
