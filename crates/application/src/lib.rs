//! Application services and ports.

#![forbid(unsafe_code)]

mod delivery_ports;
mod delivery_scheduler;
mod retry_policy;
mod webhook_delivery_service;

pub use delivery_ports::{
    ClaimedDeliveryJob, DeliveryEvent, DeliveryEventSink, DeliveryJobQueue, PayloadSigner,
    SecretEncryptor, WebhookDeliveryRepository, WebhookSendRequest, WebhookSender,
};
pub use delivery_scheduler::{DeliveryScheduler, JobResolution};
pub use retry_policy::{DEFAULT_MAX_ATTEMPTS, RetryDecision, RetryPolicy};
pub use webhook_delivery_service::{
    DeliveryOutcome, DeliveryReport, SIGNING_SECRET_MISSING_MESSAGE,
    SUBSCRIPTION_INACTIVE_MESSAGE, SUBSCRIPTION_MISSING_MESSAGE, WebhookDeliveryService,
};

#[cfg(test)]
mod test_fakes;
