//! Hand-written port fakes shared by application tests.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;

use courier_core::{AppError, AppResult, DeliveryAttemptId, SubscriptionId};
use courier_domain::{DeliveryAttempt, DispatchOutcome, WebhookSecret, WebhookSubscription};

use crate::delivery_ports::{
    DeliveryEvent, DeliveryEventSink, PayloadSigner, SecretEncryptor, WebhookDeliveryRepository,
    WebhookSendRequest, WebhookSender,
};

#[derive(Default)]
pub(crate) struct FakeDeliveryRepository {
    pub(crate) attempts: Mutex<HashMap<DeliveryAttemptId, DeliveryAttempt>>,
    pub(crate) subscriptions: Mutex<HashMap<SubscriptionId, WebhookSubscription>>,
    pub(crate) secrets: Mutex<Vec<WebhookSecret>>,
    pub(crate) save_count: Mutex<usize>,
    pub(crate) secrets_unavailable: Mutex<bool>,
}

#[async_trait]
impl WebhookDeliveryRepository for FakeDeliveryRepository {
    async fn find_attempt(
        &self,
        attempt_id: DeliveryAttemptId,
    ) -> AppResult<Option<DeliveryAttempt>> {
        Ok(self.attempts.lock().await.get(&attempt_id).cloned())
    }

    async fn find_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> AppResult<Option<WebhookSubscription>> {
        Ok(self
            .subscriptions
            .lock()
            .await
            .get(&subscription_id)
            .cloned())
    }

    async fn list_active_secrets(
        &self,
        subscription_id: SubscriptionId,
    ) -> AppResult<Vec<WebhookSecret>> {
        if *self.secrets_unavailable.lock().await {
            return Err(AppError::Internal("secret store unavailable".to_owned()));
        }

        let mut secrets: Vec<WebhookSecret> = self
            .secrets
            .lock()
            .await
            .iter()
            .filter(|secret| secret.subscription_id() == subscription_id && secret.is_active())
            .cloned()
            .collect();
        secrets.sort_by_key(|secret| std::cmp::Reverse(secret.created_at()));
        Ok(secrets)
    }

    async fn save_attempt(&self, attempt: &DeliveryAttempt) -> AppResult<()> {
        *self.save_count.lock().await += 1;
        self.attempts
            .lock()
            .await
            .insert(attempt.id(), attempt.clone());
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeSender {
    outcomes: Mutex<VecDeque<DispatchOutcome>>,
    pub(crate) requests: Mutex<Vec<WebhookSendRequest>>,
}

impl FakeSender {
    pub(crate) fn replying(outcomes: impl IntoIterator<Item = DispatchOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl WebhookSender for FakeSender {
    async fn send(&self, request: WebhookSendRequest) -> DispatchOutcome {
        self.requests.lock().await.push(request);
        self.outcomes
            .lock()
            .await
            .pop_front()
            .unwrap_or(DispatchOutcome::TransportFailed {
                reason: "no scripted response".to_owned(),
            })
    }
}

pub(crate) struct PlaintextSecretEncryptor;

impl SecretEncryptor for PlaintextSecretEncryptor {
    fn encrypt(&self, plaintext: &[u8]) -> AppResult<Vec<u8>> {
        Ok(plaintext.to_vec())
    }

    fn decrypt(&self, ciphertext: &[u8]) -> AppResult<Vec<u8>> {
        Ok(ciphertext.to_vec())
    }
}

pub(crate) struct LabelSigner;

impl PayloadSigner for LabelSigner {
    fn sign(&self, message: &[u8], secret: &[u8]) -> AppResult<String> {
        Ok(format!(
            "{}:{}",
            String::from_utf8_lossy(secret),
            message.len()
        ))
    }
}

#[derive(Default)]
pub(crate) struct RecordingEventSink {
    events: std::sync::Mutex<Vec<DeliveryEvent>>,
}

impl RecordingEventSink {
    pub(crate) fn events(&self) -> Vec<DeliveryEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl DeliveryEventSink for RecordingEventSink {
    fn record(&self, event: DeliveryEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
