use std::time::Duration;

use chrono::Utc;
use courier_application::{DeliveryJobQueue, WebhookDeliveryRepository};
use courier_core::{AppError, DeliveryAttemptId, SubscriptionId};
use courier_domain::{DeliveryAttempt, NewDeliveryAttempt, WebhookSubscription, WebhookTriggerType};
use serde_json::json;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::PostgresDeliveryJobQueue;
use crate::{MIGRATOR, PostgresWebhookDeliveryRepository};

const CLAIM_LIMIT: usize = 1_000;

async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = MIGRATOR.run(&pool).await {
        panic!("failed to run migrations for postgres delivery job queue tests: {error}");
    }

    Some(pool)
}

async fn seed_attempt(pool: &PgPool) -> DeliveryAttemptId {
    let repository = PostgresWebhookDeliveryRepository::new(pool.clone());
    let subscription_id = SubscriptionId::new();
    let subscription =
        WebhookSubscription::new(subscription_id, "https://hooks.example.com/jobs", true)
            .unwrap_or_else(|error| panic!("subscription: {error}"));
    assert!(repository.save_subscription(&subscription).await.is_ok());

    let attempt = DeliveryAttempt::new(
        NewDeliveryAttempt {
            subscription_id,
            idempotency_key: DeliveryAttemptId::new().to_string(),
            bot_id: None,
            event_type: WebhookTriggerType::CalendarEventsUpdate,
            payload: json!({"calendar_id": "cal_1"}),
        },
        Utc::now(),
    )
    .unwrap_or_else(|error| panic!("attempt: {error}"));
    assert!(repository.save_attempt(&attempt).await.is_ok());

    attempt.id()
}

#[tokio::test]
async fn queue_leases_reschedules_and_settles_jobs() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let queue = PostgresDeliveryJobQueue::new(pool.clone());
    let first = seed_attempt(&pool).await;
    let second = seed_attempt(&pool).await;

    assert!(queue.enqueue(first).await.is_ok());
    assert!(queue.enqueue(first).await.is_ok());
    assert!(queue.enqueue(second).await.is_ok());

    let claimed = queue
        .claim_due_jobs("worker-a", CLAIM_LIMIT, 60)
        .await
        .unwrap_or_else(|error| panic!("claim: {error}"));
    let first_jobs: Vec<_> = claimed.iter().filter(|job| job.attempt_id == first).collect();
    let Some(second_job) = claimed.iter().find(|job| job.attempt_id == second) else {
        panic!("second attempt should be claimed");
    };
    assert_eq!(first_jobs.len(), 1);
    let first_job = first_jobs[0];
    assert_eq!(first_job.claim_count, 1);

    let reclaimed = queue
        .claim_due_jobs("worker-b", CLAIM_LIMIT, 60)
        .await
        .unwrap_or_else(|error| panic!("second claim: {error}"));
    assert!(
        reclaimed
            .iter()
            .all(|job| job.attempt_id != first && job.attempt_id != second)
    );

    let mut stale = first_job.clone();
    stale.lease_token = "stale-token".to_owned();
    assert!(matches!(
        queue.complete_job("worker-a", &stale).await,
        Err(AppError::Conflict(_))
    ));
    assert!(matches!(
        queue.complete_job("worker-b", first_job).await,
        Err(AppError::Conflict(_))
    ));

    assert!(
        queue
            .retry_job_later("worker-a", first_job, Duration::from_secs(3_600), "HTTP 500")
            .await
            .is_ok()
    );
    assert!(
        queue
            .abandon_job("worker-a", second_job, "attempt missing")
            .await
            .is_ok()
    );

    let later = queue
        .claim_due_jobs("worker-a", CLAIM_LIMIT, 60)
        .await
        .unwrap_or_else(|error| panic!("third claim: {error}"));
    assert!(
        later
            .iter()
            .all(|job| job.attempt_id != first && job.attempt_id != second)
    );

    let made_due = sqlx::query(
        "UPDATE webhook_delivery_jobs SET run_after = now() - interval '1 second' WHERE attempt_id = $1",
    )
    .bind(first.as_uuid())
    .execute(&pool)
    .await;
    assert!(made_due.is_ok());

    let retried = queue
        .claim_due_jobs("worker-c", CLAIM_LIMIT, 60)
        .await
        .unwrap_or_else(|error| panic!("retry claim: {error}"));
    let Some(retried_job) = retried.iter().find(|job| job.attempt_id == first) else {
        panic!("rescheduled attempt should be claimable once due");
    };
    assert_eq!(retried_job.claim_count, 2);
    assert_ne!(retried_job.lease_token, first_job.lease_token);
    assert!(queue.complete_job("worker-c", retried_job).await.is_ok());
}
