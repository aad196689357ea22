//! Delivery attempt lifecycle.
//!
//! A [`DeliveryAttempt`] starts `pending` and moves to `success` or `failure`
//! on each invocation. `success` is permanent. `failure` may be followed by
//! another invocation until the retry ceiling is reached.

use chrono::{DateTime, Utc};
use courier_core::{AppError, AppResult, DeliveryAttemptId, NonEmptyString, SubscriptionId};
use serde_json::Value;

use crate::{WebhookPayload, WebhookTriggerType};

/// Maximum stored size of one response body entry, in bytes.
pub const RESPONSE_BODY_MAX_BYTES: usize = 10_000;

/// Persisted delivery status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryStatus {
    /// No invocation has completed yet.
    Pending,
    /// The destination accepted the webhook.
    Success,
    /// The latest invocation failed.
    Failure,
}

impl DeliveryStatus {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }

    /// Parses storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            _ => Err(AppError::Validation(format!(
                "unknown delivery status '{value}'"
            ))),
        }
    }
}

/// Result of one outbound send, as observed by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The destination returned an HTTP response.
    Responded {
        /// HTTP status code.
        status_code: u16,
        /// Response body bytes, possibly already capped by the transport.
        body: Vec<u8>,
    },
    /// No response was received.
    TransportFailed {
        /// Transport error description.
        reason: String,
    },
}

/// Input used to create a new pending delivery attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDeliveryAttempt {
    /// Owning subscription.
    pub subscription_id: SubscriptionId,
    /// Idempotency key shared by every retry.
    pub idempotency_key: String,
    /// Optional source bot identifier.
    pub bot_id: Option<String>,
    /// Event type.
    pub event_type: WebhookTriggerType,
    /// Event data.
    pub payload: Value,
}

/// Stored representation used to rehydrate a delivery attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDeliveryAttempt {
    /// Attempt identifier.
    pub id: DeliveryAttemptId,
    /// Owning subscription.
    pub subscription_id: SubscriptionId,
    /// Idempotency key.
    pub idempotency_key: String,
    /// Optional source bot identifier.
    pub bot_id: Option<String>,
    /// Event type.
    pub event_type: WebhookTriggerType,
    /// Event data.
    pub payload: Value,
    /// Number of invocations that reached the dispatcher.
    pub attempt_count: u32,
    /// Start of the latest invocation.
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Time of successful delivery.
    pub succeeded_at: Option<DateTime<Utc>>,
    /// Current status.
    pub status: DeliveryStatus,
    /// Latest HTTP status code received.
    pub response_status_code: Option<u16>,
    /// Response bodies in invocation order.
    pub response_body_list: Vec<String>,
    /// Latest failure explanation.
    pub error_message: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Durable record of one logical webhook event delivered to one subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryAttempt {
    id: DeliveryAttemptId,
    subscription_id: SubscriptionId,
    idempotency_key: NonEmptyString,
    bot_id: Option<String>,
    event_type: WebhookTriggerType,
    payload: Value,
    attempt_count: u32,
    last_attempt_at: Option<DateTime<Utc>>,
    succeeded_at: Option<DateTime<Utc>>,
    status: DeliveryStatus,
    response_status_code: Option<u16>,
    response_body_list: Vec<String>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
}

impl DeliveryAttempt {
    /// Creates a pending delivery attempt.
    pub fn new(input: NewDeliveryAttempt, created_at: DateTime<Utc>) -> AppResult<Self> {
        Ok(Self {
            id: DeliveryAttemptId::new(),
            subscription_id: input.subscription_id,
            idempotency_key: NonEmptyString::new(input.idempotency_key)?,
            bot_id: input.bot_id,
            event_type: input.event_type,
            payload: input.payload,
            attempt_count: 0,
            last_attempt_at: None,
            succeeded_at: None,
            status: DeliveryStatus::Pending,
            response_status_code: None,
            response_body_list: Vec::new(),
            error_message: None,
            created_at,
        })
    }

    /// Rehydrates a delivery attempt from storage.
    pub fn restore(stored: StoredDeliveryAttempt) -> AppResult<Self> {
        if stored.status == DeliveryStatus::Success && stored.succeeded_at.is_none() {
            return Err(AppError::Validation(format!(
                "delivery attempt '{}' is marked success without a success timestamp",
                stored.id
            )));
        }

        Ok(Self {
            id: stored.id,
            subscription_id: stored.subscription_id,
            idempotency_key: NonEmptyString::new(stored.idempotency_key)?,
            bot_id: stored.bot_id,
            event_type: stored.event_type,
            payload: stored.payload,
            attempt_count: stored.attempt_count,
            last_attempt_at: stored.last_attempt_at,
            succeeded_at: stored.succeeded_at,
            status: stored.status,
            response_status_code: stored.response_status_code,
            response_body_list: stored.response_body_list,
            error_message: stored.error_message,
            created_at: stored.created_at,
        })
    }

    /// Returns the attempt identifier.
    #[must_use]
    pub fn id(&self) -> DeliveryAttemptId {
        self.id
    }

    /// Returns the owning subscription.
    #[must_use]
    pub fn subscription_id(&self) -> SubscriptionId {
        self.subscription_id
    }

    /// Returns the idempotency key.
    #[must_use]
    pub fn idempotency_key(&self) -> &str {
        self.idempotency_key.as_str()
    }

    /// Returns the optional source bot identifier.
    #[must_use]
    pub fn bot_id(&self) -> Option<&str> {
        self.bot_id.as_deref()
    }

    /// Returns the event type.
    #[must_use]
    pub fn event_type(&self) -> WebhookTriggerType {
        self.event_type
    }

    /// Returns the event data.
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Returns the number of invocations that reached the dispatcher.
    #[must_use]
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Returns the start of the latest invocation.
    #[must_use]
    pub fn last_attempt_at(&self) -> Option<DateTime<Utc>> {
        self.last_attempt_at
    }

    /// Returns the time of successful delivery.
    #[must_use]
    pub fn succeeded_at(&self) -> Option<DateTime<Utc>> {
        self.succeeded_at
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> DeliveryStatus {
        self.status
    }

    /// Returns the latest HTTP status code received.
    #[must_use]
    pub fn response_status_code(&self) -> Option<u16> {
        self.response_status_code
    }

    /// Returns response bodies in invocation order.
    #[must_use]
    pub fn response_body_list(&self) -> &[String] {
        self.response_body_list.as_slice()
    }

    /// Returns the latest failure explanation.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns whether the destination already accepted this webhook.
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        self.status == DeliveryStatus::Success
    }

    /// Returns whether the attempt failed and used its whole retry budget.
    #[must_use]
    pub fn is_exhausted(&self, max_attempts: u32) -> bool {
        self.status == DeliveryStatus::Failure && self.attempt_count >= max_attempts
    }

    /// Composes the wire payload for this attempt.
    #[must_use]
    pub fn webhook_payload(&self) -> WebhookPayload {
        WebhookPayload {
            idempotency_key: self.idempotency_key.as_str().to_owned(),
            bot_id: self.bot_id.clone(),
            trigger: self.event_type.api_code().to_owned(),
            data: self.payload.clone(),
        }
    }

    /// Starts one invocation: bumps the counter and stamps the attempt time.
    pub fn begin_invocation(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        self.ensure_not_delivered()?;

        self.attempt_count = self.attempt_count.saturating_add(1);
        self.last_attempt_at = Some(now);
        Ok(())
    }

    /// Applies the dispatcher classification and returns the new status.
    pub fn apply_dispatch_outcome(
        &mut self,
        outcome: DispatchOutcome,
        now: DateTime<Utc>,
    ) -> AppResult<DeliveryStatus> {
        self.ensure_not_delivered()?;

        match outcome {
            DispatchOutcome::Responded { status_code, body } => {
                self.response_status_code = Some(status_code);
                self.response_body_list.push(truncate_response_body(&body));

                if (200..300).contains(&status_code) {
                    self.status = DeliveryStatus::Success;
                    self.succeeded_at = Some(now);
                    self.error_message = None;
                } else {
                    self.status = DeliveryStatus::Failure;
                    self.error_message =
                        Some(format!("destination responded with HTTP status {status_code}"));
                }
            }
            DispatchOutcome::TransportFailed { reason } => {
                self.status = DeliveryStatus::Failure;
                self.error_message = Some(format!("transport error: {reason}"));
            }
        }

        Ok(self.status)
    }

    /// Moves the attempt to failure without sending, recording why.
    pub fn fail_without_dispatch(&mut self, message: impl Into<String>) -> AppResult<()> {
        self.ensure_not_delivered()?;

        let message = NonEmptyString::new(message)?;
        self.status = DeliveryStatus::Failure;
        self.error_message = Some(message.into());
        Ok(())
    }

    fn ensure_not_delivered(&self) -> AppResult<()> {
        if self.is_delivered() {
            return Err(AppError::Conflict(format!(
                "delivery attempt '{}' already succeeded",
                self.id
            )));
        }

        Ok(())
    }
}

/// Caps a response body at [`RESPONSE_BODY_MAX_BYTES`] and decodes it as text.
///
/// A multi-byte character split by the cap is dropped whole, so the stored text
/// ends on the last UTF-8 character boundary at or below the limit. Invalid
/// bytes elsewhere in the body are replaced with U+FFFD.
#[must_use]
pub fn truncate_response_body(body: &[u8]) -> String {
    let mut capped = &body[..body.len().min(RESPONSE_BODY_MAX_BYTES)];
    if capped.len() < body.len() {
        capped = &capped[..complete_prefix_len(capped)];
    }

    let mut text = String::from_utf8_lossy(capped).into_owned();
    if text.len() > RESPONSE_BODY_MAX_BYTES {
        let mut end = RESPONSE_BODY_MAX_BYTES;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }

    text
}

/// Length of `bytes` without a trailing, incomplete UTF-8 sequence.
fn complete_prefix_len(bytes: &[u8]) -> usize {
    let tail_start = bytes.len().saturating_sub(3);
    let Some(lead) = (tail_start..bytes.len())
        .rev()
        .find(|index| bytes[*index] & 0b1100_0000 != 0b1000_0000)
    else {
        return bytes.len();
    };

    match std::str::from_utf8(&bytes[lead..]) {
        Err(error) if error.valid_up_to() == 0 && error.error_len().is_none() => lead,
        _ => bytes.len(),
    }
}
