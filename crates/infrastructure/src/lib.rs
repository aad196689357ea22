//! Infrastructure adapters for webhook delivery ports.

#![forbid(unsafe_code)]

mod aes_secret_encryptor;
mod hmac_payload_signer;
mod http_webhook_sender;
mod in_memory_webhook_delivery_repository;
mod postgres_delivery_job_queue;
mod postgres_webhook_delivery_repository;
mod tracing_delivery_event_sink;

pub use aes_secret_encryptor::AesSecretEncryptor;
pub use hmac_payload_signer::HmacPayloadSigner;
pub use http_webhook_sender::{
    DEFAULT_WEBHOOK_TIMEOUT, HttpWebhookSender, WEBHOOK_SIGNATURE_HEADER, WEBHOOK_USER_AGENT,
};
pub use in_memory_webhook_delivery_repository::InMemoryWebhookDeliveryRepository;
pub use postgres_delivery_job_queue::PostgresDeliveryJobQueue;
pub use postgres_webhook_delivery_repository::PostgresWebhookDeliveryRepository;
pub use tracing_delivery_event_sink::TracingDeliveryEventSink;

/// Embedded database migrations for the webhook delivery schema.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[cfg(test)]
mod delivery_flow_tests;
