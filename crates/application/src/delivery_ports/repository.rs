use async_trait::async_trait;
use courier_core::{AppResult, DeliveryAttemptId, SubscriptionId};
use courier_domain::{DeliveryAttempt, WebhookSecret, WebhookSubscription};

/// Repository port for delivery attempts and the subscriptions they target.
///
/// Saves are last-writer-wins per attempt record.
#[async_trait]
pub trait WebhookDeliveryRepository: Send + Sync {
    /// Returns one delivery attempt by identifier.
    async fn find_attempt(
        &self,
        attempt_id: DeliveryAttemptId,
    ) -> AppResult<Option<DeliveryAttempt>>;

    /// Returns one subscription by identifier.
    async fn find_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> AppResult<Option<WebhookSubscription>>;

    /// Lists active secrets for a subscription, newest first.
    async fn list_active_secrets(
        &self,
        subscription_id: SubscriptionId,
    ) -> AppResult<Vec<WebhookSecret>>;

    /// Persists every mutable field of one attempt in a single write.
    async fn save_attempt(&self, attempt: &DeliveryAttempt) -> AppResult<()>;
}
