use courier_core::{DeliveryAttemptId, SubscriptionId};
use courier_domain::{DeliveryStatus, WebhookTriggerType};

/// Observable delivery events emitted by the delivery service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryEvent {
    /// The requested attempt does not exist.
    AttemptMissing {
        /// Requested identifier.
        attempt_id: DeliveryAttemptId,
    },
    /// The attempt was skipped because it already reached a final state.
    AttemptAlreadyFinal {
        /// Attempt identifier.
        attempt_id: DeliveryAttemptId,
        /// Stored status.
        status: DeliveryStatus,
        /// Stored attempt counter.
        attempt_count: u32,
    },
    /// The subscription is disabled; the attempt was failed without sending.
    SubscriptionInactive {
        /// Attempt identifier.
        attempt_id: DeliveryAttemptId,
        /// Disabled subscription.
        subscription_id: SubscriptionId,
    },
    /// The subscription no longer exists; the attempt was failed without sending.
    SubscriptionMissing {
        /// Attempt identifier.
        attempt_id: DeliveryAttemptId,
        /// Removed subscription.
        subscription_id: SubscriptionId,
    },
    /// The stored destination URL is unusable; the attempt was failed without sending.
    DestinationUnusable {
        /// Attempt identifier.
        attempt_id: DeliveryAttemptId,
        /// Subscription with the unusable URL.
        subscription_id: SubscriptionId,
        /// Stored error message.
        reason: String,
    },
    /// The subscription has no active secret; the attempt was failed without sending.
    SigningSecretMissing {
        /// Attempt identifier.
        attempt_id: DeliveryAttemptId,
        /// Subscription without an active secret.
        subscription_id: SubscriptionId,
    },
    /// One HTTP send finished and the attempt was saved.
    Dispatched {
        /// Attempt identifier.
        attempt_id: DeliveryAttemptId,
        /// Status after the send.
        status: DeliveryStatus,
        /// HTTP status code when a response was received.
        response_status_code: Option<u16>,
        /// Attempt counter after the send.
        attempt_count: u32,
    },
    /// The attempt failed on its last allowed invocation.
    RetriesExhausted {
        /// Attempt identifier.
        attempt_id: DeliveryAttemptId,
        /// Destination URL.
        destination_url: String,
        /// Event type.
        event_type: WebhookTriggerType,
        /// Final status.
        status: DeliveryStatus,
        /// Final attempt counter.
        attempt_count: u32,
    },
    /// The job was abandoned and the attempt marked failed.
    AttemptAbandoned {
        /// Attempt identifier.
        attempt_id: DeliveryAttemptId,
        /// Attempt counter when abandoned.
        attempt_count: u32,
        /// Stored error message.
        reason: String,
    },
}

/// Port for structured delivery observability.
pub trait DeliveryEventSink: Send + Sync {
    /// Records one delivery event.
    fn record(&self, event: DeliveryEvent);
}
