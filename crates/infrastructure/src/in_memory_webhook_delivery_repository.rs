use std::collections::HashMap;

use async_trait::async_trait;
use courier_application::WebhookDeliveryRepository;
use courier_core::{AppError, AppResult, DeliveryAttemptId, SubscriptionId};
use courier_domain::{DeliveryAttempt, WebhookSecret, WebhookSubscription};
use tokio::sync::RwLock;

/// In-memory webhook delivery repository implementation.
#[derive(Debug, Default)]
pub struct InMemoryWebhookDeliveryRepository {
    subscriptions: RwLock<HashMap<SubscriptionId, WebhookSubscription>>,
    secrets: RwLock<Vec<WebhookSecret>>,
    attempts: RwLock<HashMap<DeliveryAttemptId, DeliveryAttempt>>,
}

impl InMemoryWebhookDeliveryRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces one subscription.
    pub async fn save_subscription(&self, subscription: WebhookSubscription) {
        self.subscriptions
            .write()
            .await
            .insert(subscription.id(), subscription);
    }

    /// Attaches one secret to an existing subscription.
    pub async fn add_secret(&self, secret: WebhookSecret) -> AppResult<()> {
        if !self
            .subscriptions
            .read()
            .await
            .contains_key(&secret.subscription_id())
        {
            return Err(AppError::NotFound(format!(
                "webhook subscription '{}' does not exist",
                secret.subscription_id()
            )));
        }

        self.secrets.write().await.push(secret);
        Ok(())
    }
}

#[async_trait]
impl WebhookDeliveryRepository for InMemoryWebhookDeliveryRepository {
    async fn find_attempt(
        &self,
        attempt_id: DeliveryAttemptId,
    ) -> AppResult<Option<DeliveryAttempt>> {
        Ok(self.attempts.read().await.get(&attempt_id).cloned())
    }

    async fn find_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> AppResult<Option<WebhookSubscription>> {
        Ok(self.subscriptions.read().await.get(&subscription_id).cloned())
    }

    async fn list_active_secrets(
        &self,
        subscription_id: SubscriptionId,
    ) -> AppResult<Vec<WebhookSecret>> {
        let mut secrets: Vec<WebhookSecret> = self
            .secrets
            .read()
            .await
            .iter()
            .filter(|secret| secret.subscription_id() == subscription_id && secret.is_active())
            .cloned()
            .collect();
        secrets.sort_by(|left, right| right.created_at().cmp(&left.created_at()));

        Ok(secrets)
    }

    async fn save_attempt(&self, attempt: &DeliveryAttempt) -> AppResult<()> {
        if !self
            .subscriptions
            .read()
            .await
            .contains_key(&attempt.subscription_id())
        {
            return Err(AppError::NotFound(format!(
                "webhook subscription '{}' does not exist",
                attempt.subscription_id()
            )));
        }

        self.attempts
            .write()
            .await
            .insert(attempt.id(), attempt.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use courier_application::WebhookDeliveryRepository;
    use courier_core::{AppError, AppResult, SecretId, SubscriptionId};
    use courier_domain::{
        DeliveryAttempt, NewDeliveryAttempt, WebhookSecret, WebhookSubscription,
        WebhookTriggerType,
    };
    use serde_json::json;

    use super::InMemoryWebhookDeliveryRepository;

    async fn repository_with_subscription()
    -> AppResult<(InMemoryWebhookDeliveryRepository, SubscriptionId)> {
        let repository = InMemoryWebhookDeliveryRepository::new();
        let subscription_id = SubscriptionId::new();
        repository
            .save_subscription(WebhookSubscription::new(
                subscription_id,
                "https://hooks.example.com/in",
                true,
            )?)
            .await;

        Ok((repository, subscription_id))
    }

    #[tokio::test]
    async fn active_secrets_are_listed_newest_first() -> AppResult<()> {
        let (repository, subscription_id) = repository_with_subscription().await?;
        let now = Utc::now();
        let older = SecretId::new();
        let newer = SecretId::new();

        for (id, is_active, created_at) in [
            (older, true, now - Duration::days(2)),
            (newer, true, now),
            (SecretId::new(), false, now + Duration::days(1)),
        ] {
            repository
                .add_secret(WebhookSecret::new(
                    id,
                    subscription_id,
                    b"s".to_vec(),
                    is_active,
                    created_at,
                ))
                .await?;
        }

        let secrets = repository.list_active_secrets(subscription_id).await?;
        let ids: Vec<SecretId> = secrets.iter().map(WebhookSecret::id).collect();

        assert_eq!(ids, vec![newer, older]);
        Ok(())
    }

    #[tokio::test]
    async fn save_attempt_overwrites_previous_state() -> AppResult<()> {
        let (repository, subscription_id) = repository_with_subscription().await?;
        let mut attempt = DeliveryAttempt::new(
            NewDeliveryAttempt {
                subscription_id,
                idempotency_key: "k1".to_owned(),
                bot_id: Some("bot_1".to_owned()),
                event_type: WebhookTriggerType::TranscriptUpdate,
                payload: json!({"text": "hello"}),
            },
            Utc::now(),
        )?;
        repository.save_attempt(&attempt).await?;

        attempt.begin_invocation(Utc::now())?;
        repository.save_attempt(&attempt).await?;

        let stored = repository.find_attempt(attempt.id()).await?;
        assert_eq!(stored.map(|value| value.attempt_count()), Some(1));
        Ok(())
    }

    #[tokio::test]
    async fn secrets_require_known_subscription() {
        let repository = InMemoryWebhookDeliveryRepository::new();
        let result = repository
            .add_secret(WebhookSecret::new(
                SecretId::new(),
                SubscriptionId::new(),
                b"s".to_vec(),
                true,
                Utc::now(),
            ))
            .await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
