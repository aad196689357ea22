use std::sync::Arc;

use chrono::Utc;
use courier_core::{AppError, AppResult, DeliveryAttemptId};
use courier_domain::{DeliveryAttempt, DeliveryStatus, WebhookSecret};

use crate::delivery_ports::{
    DeliveryEvent, DeliveryEventSink, PayloadSigner, SecretEncryptor, WebhookDeliveryRepository,
    WebhookSendRequest, WebhookSender,
};

/// Error message stored when the owning subscription is disabled.
pub const SUBSCRIPTION_INACTIVE_MESSAGE: &str = "Webhook subscription is no longer active";

/// Error message stored when the owning subscription was removed.
pub const SUBSCRIPTION_MISSING_MESSAGE: &str = "Webhook subscription no longer exists";

/// Error message stored when no active signing secret exists.
pub const SIGNING_SECRET_MISSING_MESSAGE: &str =
    "Webhook subscription has no active signing secret";

/// Classification of one delivery invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The destination accepted the webhook.
    Delivered,
    /// The send failed and may be retried.
    Failed,
    /// The subscription is disabled; no send happened.
    SubscriptionInactive,
    /// The subscription was removed; no send happened.
    SubscriptionMissing,
    /// The stored destination URL cannot be delivered to; no send happened.
    DestinationUnusable,
    /// No active secret could sign the payload; no send happened.
    SigningSecretMissing,
    /// The attempt had already succeeded; nothing was done.
    AlreadyDelivered,
    /// The attempt had already used its retry budget; nothing was done.
    AlreadyExhausted,
}

impl DeliveryOutcome {
    /// Returns whether no further invocation should follow.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Failed)
    }

    /// Returns stable label value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::SubscriptionInactive => "subscription_inactive",
            Self::SubscriptionMissing => "subscription_missing",
            Self::DestinationUnusable => "destination_unusable",
            Self::SigningSecretMissing => "signing_secret_missing",
            Self::AlreadyDelivered => "already_delivered",
            Self::AlreadyExhausted => "already_exhausted",
        }
    }
}

/// Summary of one delivery invocation returned to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Attempt identifier.
    pub attempt_id: DeliveryAttemptId,
    /// Invocation classification.
    pub outcome: DeliveryOutcome,
    /// Stored status after the invocation.
    pub status: DeliveryStatus,
    /// Stored attempt counter after the invocation.
    pub attempt_count: u32,
}

impl DeliveryReport {
    fn from_attempt(attempt: &DeliveryAttempt, outcome: DeliveryOutcome) -> Self {
        Self {
            attempt_id: attempt.id(),
            outcome,
            status: attempt.status(),
            attempt_count: attempt.attempt_count(),
        }
    }
}

/// Runs one invocation of the delivery-attempt state machine.
#[derive(Clone)]
pub struct WebhookDeliveryService {
    repository: Arc<dyn WebhookDeliveryRepository>,
    sender: Arc<dyn WebhookSender>,
    signer: Arc<dyn PayloadSigner>,
    secret_encryptor: Arc<dyn SecretEncryptor>,
    events: Arc<dyn DeliveryEventSink>,
    max_attempts: u32,
}

impl WebhookDeliveryService {
    /// Creates a delivery service.
    #[must_use]
    pub fn new(
        repository: Arc<dyn WebhookDeliveryRepository>,
        sender: Arc<dyn WebhookSender>,
        signer: Arc<dyn PayloadSigner>,
        secret_encryptor: Arc<dyn SecretEncryptor>,
        events: Arc<dyn DeliveryEventSink>,
        max_attempts: u32,
    ) -> Self {
        Self {
            repository,
            sender,
            signer,
            secret_encryptor,
            events,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Returns the attempt ceiling used for exhaustion checks.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delivers one attempt by its textual identifier.
    ///
    /// Delivery failures are returned as [`DeliveryOutcome::Failed`]. `Err` is
    /// reserved for malformed identifiers, a missing attempt and storage errors.
    pub async fn deliver(&self, attempt_id: &str) -> AppResult<DeliveryReport> {
        let attempt_id = DeliveryAttemptId::parse(attempt_id)?;
        self.deliver_attempt(attempt_id).await
    }

    /// Delivers one attempt.
    pub async fn deliver_attempt(&self, attempt_id: DeliveryAttemptId) -> AppResult<DeliveryReport> {
        let Some(mut attempt) = self.repository.find_attempt(attempt_id).await? else {
            self.events.record(DeliveryEvent::AttemptMissing { attempt_id });
            return Err(AppError::NotFound(format!(
                "webhook delivery attempt '{attempt_id}' does not exist"
            )));
        };

        if attempt.is_delivered() || attempt.is_exhausted(self.max_attempts) {
            self.events.record(DeliveryEvent::AttemptAlreadyFinal {
                attempt_id,
                status: attempt.status(),
                attempt_count: attempt.attempt_count(),
            });
            let outcome = if attempt.is_delivered() {
                DeliveryOutcome::AlreadyDelivered
            } else {
                DeliveryOutcome::AlreadyExhausted
            };
            return Ok(DeliveryReport::from_attempt(&attempt, outcome));
        }

        let Some(subscription) = self
            .repository
            .find_subscription(attempt.subscription_id())
            .await?
        else {
            attempt.fail_without_dispatch(SUBSCRIPTION_MISSING_MESSAGE)?;
            self.repository.save_attempt(&attempt).await?;
            self.events.record(DeliveryEvent::SubscriptionMissing {
                attempt_id,
                subscription_id: attempt.subscription_id(),
            });
            return Ok(DeliveryReport::from_attempt(
                &attempt,
                DeliveryOutcome::SubscriptionMissing,
            ));
        };

        if !subscription.is_active() {
            attempt.fail_without_dispatch(SUBSCRIPTION_INACTIVE_MESSAGE)?;
            self.repository.save_attempt(&attempt).await?;
            self.events.record(DeliveryEvent::SubscriptionInactive {
                attempt_id,
                subscription_id: subscription.id(),
            });
            return Ok(DeliveryReport::from_attempt(
                &attempt,
                DeliveryOutcome::SubscriptionInactive,
            ));
        }

        let destination_url = match subscription.destination_url() {
            Ok(url) => url.to_string(),
            Err(error) => {
                let reason = format!("Webhook subscription url is not deliverable: {error}");
                attempt.fail_without_dispatch(reason.as_str())?;
                self.repository.save_attempt(&attempt).await?;
                self.events.record(DeliveryEvent::DestinationUnusable {
                    attempt_id,
                    subscription_id: subscription.id(),
                    reason,
                });
                return Ok(DeliveryReport::from_attempt(
                    &attempt,
                    DeliveryOutcome::DestinationUnusable,
                ));
            }
        };

        let secrets = self
            .repository
            .list_active_secrets(subscription.id())
            .await?;
        let Some(secret) = WebhookSecret::current(&secrets) else {
            attempt.fail_without_dispatch(SIGNING_SECRET_MISSING_MESSAGE)?;
            self.repository.save_attempt(&attempt).await?;
            self.events.record(DeliveryEvent::SigningSecretMissing {
                attempt_id,
                subscription_id: subscription.id(),
            });
            return Ok(DeliveryReport::from_attempt(
                &attempt,
                DeliveryOutcome::SigningSecretMissing,
            ));
        };

        let body = attempt.webhook_payload().canonical_bytes()?;
        let secret_value = self.secret_encryptor.decrypt(secret.encrypted_secret())?;
        let signature = self.signer.sign(&body, &secret_value)?;

        attempt.begin_invocation(Utc::now())?;
        let dispatch_outcome = self
            .sender
            .send(WebhookSendRequest {
                destination_url: destination_url.clone(),
                body,
                signature,
            })
            .await;
        let status = attempt.apply_dispatch_outcome(dispatch_outcome, Utc::now())?;

        self.repository.save_attempt(&attempt).await?;
        self.events.record(DeliveryEvent::Dispatched {
            attempt_id,
            status,
            response_status_code: attempt.response_status_code(),
            attempt_count: attempt.attempt_count(),
        });

        if attempt.is_exhausted(self.max_attempts) {
            self.events.record(DeliveryEvent::RetriesExhausted {
                attempt_id,
                destination_url,
                event_type: attempt.event_type(),
                status,
                attempt_count: attempt.attempt_count(),
            });
        }

        let outcome = if status == DeliveryStatus::Success {
            DeliveryOutcome::Delivered
        } else {
            DeliveryOutcome::Failed
        };

        Ok(DeliveryReport::from_attempt(&attempt, outcome))
    }

    /// Records a terminal failure on an attempt whose job is being abandoned.
    ///
    /// Delivered attempts are left untouched. Returns `None` when the attempt
    /// does not exist.
    pub async fn fail_attempt(
        &self,
        attempt_id: DeliveryAttemptId,
        reason: &str,
    ) -> AppResult<Option<DeliveryReport>> {
        let Some(mut attempt) = self.repository.find_attempt(attempt_id).await? else {
            return Ok(None);
        };

        if attempt.is_delivered() {
            return Ok(Some(DeliveryReport::from_attempt(
                &attempt,
                DeliveryOutcome::AlreadyDelivered,
            )));
        }

        attempt.fail_without_dispatch(reason)?;
        self.repository.save_attempt(&attempt).await?;
        self.events.record(DeliveryEvent::AttemptAbandoned {
            attempt_id,
            attempt_count: attempt.attempt_count(),
            reason: reason.to_owned(),
        });

        Ok(Some(DeliveryReport::from_attempt(
            &attempt,
            DeliveryOutcome::Failed,
        )))
    }
}
