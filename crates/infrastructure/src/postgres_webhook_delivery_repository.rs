use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_application::WebhookDeliveryRepository;
use courier_core::{AppError, AppResult, DeliveryAttemptId, SecretId, SubscriptionId};
use courier_domain::{
    DeliveryAttempt, DeliveryStatus, StoredDeliveryAttempt, WebhookSecret, WebhookSubscription,
    WebhookTriggerType,
};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};

/// PostgreSQL-backed webhook delivery repository.
#[derive(Clone)]
pub struct PostgresWebhookDeliveryRepository {
    pool: PgPool,
}

impl PostgresWebhookDeliveryRepository {
    /// Creates a webhook delivery repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts or updates one subscription.
    pub async fn save_subscription(&self, subscription: &WebhookSubscription) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO webhook_subscriptions (id, url, is_active, updated_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (id)
            DO UPDATE SET
                url = EXCLUDED.url,
                is_active = EXCLUDED.is_active,
                updated_at = now()
            "#,
        )
        .bind(subscription.id().as_uuid())
        .bind(subscription.url())
        .bind(subscription.is_active())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to save webhook subscription '{}': {error}",
                subscription.id()
            ))
        })?;

        Ok(())
    }

    /// Stores one encrypted signing secret.
    pub async fn add_secret(&self, secret: &WebhookSecret) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO webhook_secrets (id, subscription_id, encrypted_secret, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(secret.id().as_uuid())
        .bind(secret.subscription_id().as_uuid())
        .bind(secret.encrypted_secret())
        .bind(secret.is_active())
        .bind(secret.created_at())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to store secret for webhook subscription '{}': {error}",
                secret.subscription_id()
            ))
        })?;

        Ok(())
    }
}

#[derive(Debug, FromRow)]
struct WebhookSubscriptionRow {
    id: uuid::Uuid,
    url: String,
    is_active: bool,
}

#[derive(Debug, FromRow)]
struct WebhookSecretRow {
    id: uuid::Uuid,
    subscription_id: uuid::Uuid,
    encrypted_secret: Vec<u8>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct DeliveryAttemptRow {
    id: uuid::Uuid,
    subscription_id: uuid::Uuid,
    idempotency_key: String,
    bot_id: Option<String>,
    event_type: String,
    payload: Value,
    attempt_count: i32,
    last_attempt_at: Option<DateTime<Utc>>,
    succeeded_at: Option<DateTime<Utc>>,
    status: String,
    response_status_code: Option<i32>,
    response_body_list: Json<Vec<String>>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
}

#[async_trait]
impl WebhookDeliveryRepository for PostgresWebhookDeliveryRepository {
    async fn find_attempt(
        &self,
        attempt_id: DeliveryAttemptId,
    ) -> AppResult<Option<DeliveryAttempt>> {
        let row = sqlx::query_as::<_, DeliveryAttemptRow>(
            r#"
            SELECT
                id,
                subscription_id,
                idempotency_key,
                bot_id,
                event_type,
                payload,
                attempt_count,
                last_attempt_at,
                succeeded_at,
                status,
                response_status_code,
                response_body_list,
                error_message,
                created_at
            FROM webhook_delivery_attempts
            WHERE id = $1
            "#,
        )
        .bind(attempt_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to load webhook delivery attempt '{attempt_id}': {error}"
            ))
        })?;

        row.map(delivery_attempt_from_row).transpose()
    }

    async fn find_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> AppResult<Option<WebhookSubscription>> {
        let row = sqlx::query_as::<_, WebhookSubscriptionRow>(
            r#"
            SELECT id, url, is_active
            FROM webhook_subscriptions
            WHERE id = $1
            "#,
        )
        .bind(subscription_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to load webhook subscription '{subscription_id}': {error}"
            ))
        })?;

        Ok(row.map(|row| {
            WebhookSubscription::restore(SubscriptionId::from_uuid(row.id), row.url, row.is_active)
        }))
    }

    async fn list_active_secrets(
        &self,
        subscription_id: SubscriptionId,
    ) -> AppResult<Vec<WebhookSecret>> {
        let rows = sqlx::query_as::<_, WebhookSecretRow>(
            r#"
            SELECT id, subscription_id, encrypted_secret, is_active, created_at
            FROM webhook_secrets
            WHERE subscription_id = $1
              AND is_active
            ORDER BY created_at DESC
            "#,
        )
        .bind(subscription_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list secrets for webhook subscription '{subscription_id}': {error}"
            ))
        })?;

        Ok(rows
            .into_iter()
            .map(|row| {
                WebhookSecret::new(
                    SecretId::from_uuid(row.id),
                    SubscriptionId::from_uuid(row.subscription_id),
                    row.encrypted_secret,
                    row.is_active,
                    row.created_at,
                )
            })
            .collect())
    }

    async fn save_attempt(&self, attempt: &DeliveryAttempt) -> AppResult<()> {
        let attempt_count = i32::try_from(attempt.attempt_count()).map_err(|error| {
            AppError::Validation(format!("invalid webhook attempt_count value: {error}"))
        })?;

        sqlx::query(
            r#"
            INSERT INTO webhook_delivery_attempts (
                id,
                subscription_id,
                idempotency_key,
                bot_id,
                event_type,
                payload,
                attempt_count,
                last_attempt_at,
                succeeded_at,
                status,
                response_status_code,
                response_body_list,
                error_message,
                created_at,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, now())
            ON CONFLICT (id)
            DO UPDATE SET
                attempt_count = EXCLUDED.attempt_count,
                last_attempt_at = EXCLUDED.last_attempt_at,
                succeeded_at = EXCLUDED.succeeded_at,
                status = EXCLUDED.status,
                response_status_code = EXCLUDED.response_status_code,
                response_body_list = EXCLUDED.response_body_list,
                error_message = EXCLUDED.error_message,
                updated_at = now()
            "#,
        )
        .bind(attempt.id().as_uuid())
        .bind(attempt.subscription_id().as_uuid())
        .bind(attempt.idempotency_key())
        .bind(attempt.bot_id())
        .bind(attempt.event_type().as_str())
        .bind(attempt.payload())
        .bind(attempt_count)
        .bind(attempt.last_attempt_at())
        .bind(attempt.succeeded_at())
        .bind(attempt.status().as_str())
        .bind(attempt.response_status_code().map(i32::from))
        .bind(Json(attempt.response_body_list()))
        .bind(attempt.error_message())
        .bind(attempt.created_at())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to save webhook delivery attempt '{}': {error}",
                attempt.id()
            ))
        })?;

        Ok(())
    }
}

fn delivery_attempt_from_row(row: DeliveryAttemptRow) -> AppResult<DeliveryAttempt> {
    let attempt_count = u32::try_from(row.attempt_count).map_err(|error| {
        AppError::Internal(format!(
            "invalid attempt_count for webhook delivery attempt '{}': {error}",
            row.id
        ))
    })?;
    let response_status_code = row
        .response_status_code
        .map(|value| {
            u16::try_from(value).map_err(|error| {
                AppError::Internal(format!(
                    "invalid response_status_code for webhook delivery attempt '{}': {error}",
                    row.id
                ))
            })
        })
        .transpose()?;

    DeliveryAttempt::restore(StoredDeliveryAttempt {
        id: DeliveryAttemptId::from_uuid(row.id),
        subscription_id: SubscriptionId::from_uuid(row.subscription_id),
        idempotency_key: row.idempotency_key,
        bot_id: row.bot_id,
        event_type: WebhookTriggerType::parse(row.event_type.as_str())?,
        payload: row.payload,
        attempt_count,
        last_attempt_at: row.last_attempt_at,
        succeeded_at: row.succeeded_at,
        status: DeliveryStatus::parse(row.status.as_str())?,
        response_status_code,
        response_body_list: row.response_body_list.0,
        error_message: row.error_message,
        created_at: row.created_at,
    })
}
