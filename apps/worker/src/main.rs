//! Courier webhook delivery worker runtime.

#![forbid(unsafe_code)]

mod config;

use std::sync::Arc;
use std::time::Duration;

use courier_application::{
    ClaimedDeliveryJob, DeliveryScheduler, JobResolution, RetryPolicy, WebhookDeliveryService,
};
use courier_core::{AppError, AppResult};
use courier_infrastructure::{
    AesSecretEncryptor, DEFAULT_WEBHOOK_TIMEOUT, HmacPayloadSigner, HttpWebhookSender, MIGRATOR,
    PostgresDeliveryJobQueue, PostgresWebhookDeliveryRepository, TracingDeliveryEventSink,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::task::JoinSet;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::WorkerConfig;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let pool = connect_pool(config.database_url.as_str()).await?;

    if config.migrate_on_start {
        MIGRATOR.run(&pool).await.map_err(|error| {
            AppError::Internal(format!("failed to run database migrations: {error}"))
        })?;
        info!("database migrations applied");
    }

    let scheduler = build_scheduler(pool, &config)?;

    info!(
        worker_id = %config.worker_id,
        claim_limit = config.claim_limit,
        lease_seconds = config.lease_seconds,
        poll_interval_ms = config.poll_interval_ms,
        max_attempts = config.max_attempts,
        "courier-worker started"
    );

    loop {
        let claimed_jobs = match scheduler
            .claim_jobs_for_worker(
                config.worker_id.as_str(),
                config.claim_limit,
                config.lease_seconds,
            )
            .await
        {
            Ok(claimed_jobs) => claimed_jobs,
            Err(error) => {
                warn!(
                    worker_id = %config.worker_id,
                    error = %error,
                    "failed to claim webhook delivery jobs"
                );
                tokio::time::sleep(Duration::from_millis(config.poll_interval_ms)).await;
                continue;
            }
        };

        if claimed_jobs.is_empty() {
            tokio::time::sleep(Duration::from_millis(config.poll_interval_ms)).await;
            continue;
        }

        info!(
            worker_id = %config.worker_id,
            claimed_count = claimed_jobs.len(),
            "claimed webhook delivery jobs"
        );

        run_claimed_jobs(&scheduler, config.worker_id.as_str(), claimed_jobs).await;
    }
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

fn build_scheduler(pool: PgPool, config: &WorkerConfig) -> AppResult<DeliveryScheduler> {
    let repository = Arc::new(PostgresWebhookDeliveryRepository::new(pool.clone()));
    let queue = Arc::new(PostgresDeliveryJobQueue::new(pool));
    let secret_encryptor = Arc::new(AesSecretEncryptor::from_hex(
        config.secret_encryption_key.as_str(),
    )?);
    let retry_policy = RetryPolicy::new(
        config.max_attempts,
        config.retry_base_delay,
        config.retry_max_delay,
    )?;

    let delivery_service = WebhookDeliveryService::new(
        repository,
        Arc::new(HttpWebhookSender::with_timeout(DEFAULT_WEBHOOK_TIMEOUT)?),
        Arc::new(HmacPayloadSigner::new()),
        secret_encryptor,
        Arc::new(TracingDeliveryEventSink::new()),
        retry_policy.max_attempts(),
    );

    Ok(DeliveryScheduler::new(delivery_service, queue, retry_policy))
}

/// Runs one batch concurrently; each claimed job holds a distinct attempt.
async fn run_claimed_jobs(
    scheduler: &DeliveryScheduler,
    worker_id: &str,
    claimed_jobs: Vec<ClaimedDeliveryJob>,
) {
    let mut tasks = JoinSet::new();
    for job in claimed_jobs {
        let scheduler = scheduler.clone();
        let worker_id = worker_id.to_owned();
        tasks.spawn(async move {
            let job_id = job.job_id.clone();
            let attempt_id = job.attempt_id;
            let result = scheduler.run_claimed_job(worker_id.as_str(), job).await;
            (worker_id, job_id, attempt_id, result)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let (worker_id, job_id, attempt_id, result) = match joined {
            Ok(output) => output,
            Err(error) => {
                warn!(error = %error, "webhook delivery task panicked or was cancelled");
                continue;
            }
        };

        match result {
            Ok(JobResolution::Completed(report)) => {
                info!(
                    worker_id = %worker_id,
                    job_id = %job_id,
                    attempt_id = %attempt_id,
                    outcome = report.outcome.as_str(),
                    attempt_count = report.attempt_count,
                    "webhook delivery job completed"
                );
            }
            Ok(JobResolution::Rescheduled { delay, reason, .. }) => {
                info!(
                    worker_id = %worker_id,
                    job_id = %job_id,
                    attempt_id = %attempt_id,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    reason = %reason,
                    "webhook delivery job rescheduled"
                );
            }
            Ok(JobResolution::Abandoned { reason }) => {
                warn!(
                    worker_id = %worker_id,
                    job_id = %job_id,
                    attempt_id = %attempt_id,
                    reason = %reason,
                    "webhook delivery job abandoned"
                );
            }
            Err(error) => {
                warn!(
                    worker_id = %worker_id,
                    job_id = %job_id,
                    attempt_id = %attempt_id,
                    error = %error,
                    "webhook delivery job execution failed"
                );
            }
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
