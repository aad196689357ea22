//! Delivery event sink that writes structured tracing records.

use courier_application::{DeliveryEvent, DeliveryEventSink};
use courier_domain::DeliveryStatus;
use tracing::{error, info, warn};

/// Emits each delivery event as one tracing record.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDeliveryEventSink;

impl TracingDeliveryEventSink {
    /// Creates a tracing event sink.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl DeliveryEventSink for TracingDeliveryEventSink {
    fn record(&self, event: DeliveryEvent) {
        match event {
            DeliveryEvent::AttemptMissing { attempt_id } => {
                error!(attempt_id = %attempt_id, "webhook delivery attempt not found");
            }
            DeliveryEvent::AttemptAlreadyFinal {
                attempt_id,
                status,
                attempt_count,
            } => {
                info!(
                    attempt_id = %attempt_id,
                    status = status.as_str(),
                    attempt_count,
                    "webhook delivery attempt already final, skipping"
                );
            }
            DeliveryEvent::SubscriptionInactive {
                attempt_id,
                subscription_id,
            } => {
                warn!(
                    attempt_id = %attempt_id,
                    subscription_id = %subscription_id,
                    "webhook subscription inactive, delivery failed without sending"
                );
            }
            DeliveryEvent::SubscriptionMissing {
                attempt_id,
                subscription_id,
            } => {
                error!(
                    attempt_id = %attempt_id,
                    subscription_id = %subscription_id,
                    "webhook subscription not found, delivery failed without sending"
                );
            }
            DeliveryEvent::DestinationUnusable {
                attempt_id,
                subscription_id,
                reason,
            } => {
                error!(
                    attempt_id = %attempt_id,
                    subscription_id = %subscription_id,
                    reason = reason.as_str(),
                    "webhook destination unusable, delivery failed without sending"
                );
            }
            DeliveryEvent::SigningSecretMissing {
                attempt_id,
                subscription_id,
            } => {
                error!(
                    attempt_id = %attempt_id,
                    subscription_id = %subscription_id,
                    "webhook subscription has no active signing secret"
                );
            }
            DeliveryEvent::Dispatched {
                attempt_id,
                status,
                response_status_code,
                attempt_count,
            } => {
                if status == DeliveryStatus::Success {
                    info!(
                        attempt_id = %attempt_id,
                        response_status_code,
                        attempt_count,
                        "webhook delivered"
                    );
                } else {
                    warn!(
                        attempt_id = %attempt_id,
                        status = status.as_str(),
                        response_status_code,
                        attempt_count,
                        "webhook delivery failed"
                    );
                }
            }
            DeliveryEvent::RetriesExhausted {
                attempt_id,
                destination_url,
                event_type,
                status,
                attempt_count,
            } => {
                error!(
                    attempt_id = %attempt_id,
                    destination_url = destination_url.as_str(),
                    event_type = event_type.as_str(),
                    status = status.as_str(),
                    attempt_count,
                    "webhook delivery exhausted retries"
                );
            }
            DeliveryEvent::AttemptAbandoned {
                attempt_id,
                attempt_count,
                reason,
            } => {
                error!(
                    attempt_id = %attempt_id,
                    attempt_count,
                    reason = reason.as_str(),
                    "webhook delivery job abandoned"
                );
            }
        }
    }
}
