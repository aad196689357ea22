use async_trait::async_trait;
use courier_domain::DispatchOutcome;

/// Signed outbound webhook request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookSendRequest {
    /// Destination URL.
    pub destination_url: String,
    /// Canonical JSON body, identical to the signed bytes.
    pub body: Vec<u8>,
    /// Signature header value.
    pub signature: String,
}

/// Port for the outbound HTTP send.
///
/// Transport errors are reported as [`DispatchOutcome::TransportFailed`],
/// never as `Err`.
#[async_trait]
pub trait WebhookSender: Send + Sync {
    /// Sends one webhook and classifies what came back.
    async fn send(&self, request: WebhookSendRequest) -> DispatchOutcome;
}
