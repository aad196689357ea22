//! reqwest-backed webhook sender.

use std::time::Duration;

use async_trait::async_trait;
use courier_application::{WebhookSendRequest, WebhookSender};
use courier_core::{AppError, AppResult};
use courier_domain::{DispatchOutcome, RESPONSE_BODY_MAX_BYTES};
use reqwest::header::{CONTENT_TYPE, USER_AGENT};

/// User agent sent with every webhook.
pub const WEBHOOK_USER_AGENT: &str = "Courier-Webhook/1.0";

/// Header carrying the base64 HMAC-SHA256 payload signature.
pub const WEBHOOK_SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// Default per-request timeout covering connect, send and response.
pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP implementation of the webhook sender port.
#[derive(Clone)]
pub struct HttpWebhookSender {
    http_client: reqwest::Client,
}

impl HttpWebhookSender {
    /// Creates a sender around an existing client.
    #[must_use]
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    /// Creates a sender whose requests time out after `timeout`.
    pub fn with_timeout(timeout: Duration) -> AppResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| {
                AppError::Internal(format!("failed to build webhook http client: {error}"))
            })?;

        Ok(Self::new(http_client))
    }

    async fn read_capped_body(response: &mut reqwest::Response) -> Result<Vec<u8>, reqwest::Error> {
        let mut body = Vec::new();
        while body.len() < RESPONSE_BODY_MAX_BYTES {
            let Some(chunk) = response.chunk().await? else {
                break;
            };
            let remaining = RESPONSE_BODY_MAX_BYTES - body.len();
            body.extend_from_slice(&chunk[..chunk.len().min(remaining)]);
        }

        Ok(body)
    }
}

#[async_trait]
impl WebhookSender for HttpWebhookSender {
    async fn send(&self, request: WebhookSendRequest) -> DispatchOutcome {
        let response = self
            .http_client
            .post(request.destination_url.as_str())
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, WEBHOOK_USER_AGENT)
            .header(WEBHOOK_SIGNATURE_HEADER, request.signature.as_str())
            .body(request.body)
            .send()
            .await;

        let mut response = match response {
            Ok(response) => response,
            Err(error) => {
                return DispatchOutcome::TransportFailed {
                    reason: error.to_string(),
                };
            }
        };

        let status_code = response.status().as_u16();
        match Self::read_capped_body(&mut response).await {
            Ok(body) => DispatchOutcome::Responded { status_code, body },
            Err(error) => DispatchOutcome::TransportFailed {
                reason: format!("failed to read response body: {error}"),
            },
        }
    }
}
