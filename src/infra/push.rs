use anyhow::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::AppConfig;
use crate::domain::push_subscription::{PushKeys, PushPayload, PushSubscription};

/// Seconds the push service may hold an undelivered message.
const PUSH_TTL_SECONDS: u32 = 86_400;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("push endpoint is gone (status {0})")]
    Gone(u16),
    #[error("push gateway rejected delivery (status {0})")]
    Rejected(u16),
    #[error("invalid push endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("push transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl PushError {
    /// Permanent failures mean the subscription can never succeed again.
    pub fn is_permanent(&self) -> bool {
        matches!(self, PushError::Gone(_) | PushError::InvalidEndpoint(_))
    }
}

/// Delivery channel used when a user has no live stream.
#[async_trait]
pub trait OfflinePusher: Send + Sync {
    async fn send(
        &self,
        subscription: &PushSubscription,
        payload: &PushPayload,
    ) -> Result<(), PushError>;
}

/// Accepts only absolute https endpoints with a host.
pub fn validate_endpoint(endpoint: &str) -> Result<Url, PushError> {
    let url = Url::parse(endpoint)
        .map_err(|err| PushError::InvalidEndpoint(err.to_string()))?;
    if url.scheme() != "https" {
        return Err(PushError::InvalidEndpoint("endpoint must use https".into()));
    }
    if url.host_str().is_none() {
        return Err(PushError::InvalidEndpoint("endpoint must have a host".into()));
    }
    Ok(url)
}

#[derive(Serialize)]
struct GatewayRequest<'a> {
    endpoint: &'a str,
    keys: &'a PushKeys,
    ttl: u32,
    payload: &'a PushPayload,
}

/// Hands push messages to a gateway that performs Web Push encryption and
/// delivery. The gateway mirrors the push service status: 404/410 when the
/// endpoint no longer exists.
#[derive(Clone)]
pub struct PushGatewayClient {
    client: reqwest::Client,
    gateway_url: Url,
}

impl PushGatewayClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        Self::with_url(
            Url::parse(&config.push_gateway_url)?,
            Duration::from_secs(config.push_timeout_seconds),
        )
    }

    pub fn with_url(gateway_url: Url, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            gateway_url,
        })
    }
}

#[async_trait]
impl OfflinePusher for PushGatewayClient {
    async fn send(
        &self,
        subscription: &PushSubscription,
        payload: &PushPayload,
    ) -> Result<(), PushError> {
        validate_endpoint(&subscription.endpoint)?;

        let response = self
            .client
            .post(self.gateway_url.clone())
            .json(&GatewayRequest {
                endpoint: &subscription.endpoint,
                keys: &subscription.keys,
                ttl: PUSH_TTL_SECONDS,
                payload,
            })
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                debug!(
                    subscription_id = %subscription.id,
                    notification_id = %payload.notification_id,
                    "push delivered to gateway"
                );
                Ok(())
            }
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                Err(PushError::Gone(response.status().as_u16()))
            }
            status => Err(PushError::Rejected(status.as_u16())),
        }
    }
}
