//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod delivery;
mod payload;
mod subscription;
mod trigger;

pub use delivery::{
    DeliveryAttempt, DeliveryStatus, DispatchOutcome, NewDeliveryAttempt,
    RESPONSE_BODY_MAX_BYTES, StoredDeliveryAttempt, truncate_response_body,
};
pub use payload::WebhookPayload;
pub use subscription::{WebhookSecret, WebhookSubscription};
pub use trigger::WebhookTriggerType;
