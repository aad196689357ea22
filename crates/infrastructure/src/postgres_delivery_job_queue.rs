use std::time::Duration;

use async_trait::async_trait;
use courier_application::{ClaimedDeliveryJob, DeliveryJobQueue};
use courier_core::{AppError, AppResult, DeliveryAttemptId};
use sqlx::{FromRow, PgPool};

/// PostgreSQL-backed delivery job queue.
///
/// Jobs are claimed with `FOR UPDATE SKIP LOCKED` under a lease, so each
/// attempt has at most one invocation in flight across workers. Expired
/// leases become claimable again.
#[derive(Clone)]
pub struct PostgresDeliveryJobQueue {
    pool: PgPool,
}

impl PostgresDeliveryJobQueue {
    /// Creates a delivery job queue with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct ClaimedDeliveryJobRow {
    job_id: uuid::Uuid,
    attempt_id: uuid::Uuid,
    lease_token: String,
    claim_count: i32,
}

fn parse_job_id(job: &ClaimedDeliveryJob) -> AppResult<uuid::Uuid> {
    uuid::Uuid::parse_str(job.job_id.as_str()).map_err(|error| {
        AppError::Validation(format!(
            "invalid webhook delivery job id '{}': {error}",
            job.job_id
        ))
    })
}

fn lease_conflict(job: &ClaimedDeliveryJob, worker_id: &str) -> AppError {
    AppError::Conflict(format!(
        "webhook delivery job '{}' is not currently leased by worker '{worker_id}' with matching lease token",
        job.job_id
    ))
}

#[async_trait]
impl DeliveryJobQueue for PostgresDeliveryJobQueue {
    async fn enqueue(&self, attempt_id: DeliveryAttemptId) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO webhook_delivery_jobs (attempt_id, status, run_after)
            VALUES ($1, 'pending', now())
            ON CONFLICT (attempt_id)
            DO NOTHING
            "#,
        )
        .bind(attempt_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to enqueue webhook delivery attempt '{attempt_id}': {error}"
            ))
        })?;

        Ok(())
    }

    async fn claim_due_jobs(
        &self,
        worker_id: &str,
        limit: usize,
        lease_seconds: u32,
    ) -> AppResult<Vec<ClaimedDeliveryJob>> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to start webhook delivery job claim transaction: {error}"
            ))
        })?;

        let rows = sqlx::query_as::<_, ClaimedDeliveryJobRow>(
            r#"
            WITH candidate_jobs AS (
                SELECT id
                FROM webhook_delivery_jobs
                WHERE (
                        (status = 'pending' AND run_after <= now())
                        OR (status = 'leased' AND lease_expires_at < now())
                      )
                ORDER BY run_after ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE webhook_delivery_jobs jobs
            SET
                status = 'leased',
                leased_by = $2,
                lease_token = gen_random_uuid()::TEXT,
                lease_expires_at = now() + make_interval(secs => $3::INT),
                claim_count = jobs.claim_count + 1,
                updated_at = now()
            FROM candidate_jobs
            WHERE jobs.id = candidate_jobs.id
            RETURNING jobs.id AS job_id, jobs.attempt_id, jobs.lease_token, jobs.claim_count
            "#,
        )
        .bind(i64::try_from(limit).map_err(|error| {
            AppError::Validation(format!("invalid webhook delivery claim limit: {error}"))
        })?)
        .bind(worker_id)
        .bind(i32::try_from(lease_seconds).map_err(|error| {
            AppError::Validation(format!("invalid webhook delivery lease_seconds: {error}"))
        })?)
        .fetch_all(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to claim webhook delivery jobs for worker '{worker_id}': {error}"
            ))
        })?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to commit webhook delivery job claim transaction: {error}"
            ))
        })?;

        rows.into_iter()
            .map(|row| {
                Ok(ClaimedDeliveryJob {
                    job_id: row.job_id.to_string(),
                    attempt_id: DeliveryAttemptId::from_uuid(row.attempt_id),
                    lease_token: row.lease_token,
                    claim_count: u32::try_from(row.claim_count).map_err(|error| {
                        AppError::Internal(format!(
                            "invalid claim_count for webhook delivery job '{}': {error}",
                            row.job_id
                        ))
                    })?,
                })
            })
            .collect()
    }

    async fn complete_job(&self, worker_id: &str, job: &ClaimedDeliveryJob) -> AppResult<()> {
        let job_uuid = parse_job_id(job)?;

        let result = sqlx::query(
            r#"
            UPDATE webhook_delivery_jobs
            SET
                status = 'completed',
                leased_by = NULL,
                lease_token = NULL,
                lease_expires_at = NULL,
                last_error = NULL,
                updated_at = now()
            WHERE id = $1
              AND leased_by = $2
              AND lease_token = $3
              AND status = 'leased'
            "#,
        )
        .bind(job_uuid)
        .bind(worker_id)
        .bind(job.lease_token.as_str())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to complete webhook delivery job '{}' for worker '{worker_id}': {error}",
                job.job_id
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(lease_conflict(job, worker_id));
        }

        Ok(())
    }

    async fn retry_job_later(
        &self,
        worker_id: &str,
        job: &ClaimedDeliveryJob,
        delay: Duration,
        reason: &str,
    ) -> AppResult<()> {
        let job_uuid = parse_job_id(job)?;

        let result = sqlx::query(
            r#"
            UPDATE webhook_delivery_jobs
            SET
                status = 'pending',
                run_after = now() + make_interval(secs => $4::DOUBLE PRECISION),
                leased_by = NULL,
                lease_token = NULL,
                lease_expires_at = NULL,
                last_error = $5,
                updated_at = now()
            WHERE id = $1
              AND leased_by = $2
              AND lease_token = $3
              AND status = 'leased'
            "#,
        )
        .bind(job_uuid)
        .bind(worker_id)
        .bind(job.lease_token.as_str())
        .bind(delay.as_secs_f64())
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to reschedule webhook delivery job '{}' for worker '{worker_id}': {error}",
                job.job_id
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(lease_conflict(job, worker_id));
        }

        Ok(())
    }

    async fn abandon_job(
        &self,
        worker_id: &str,
        job: &ClaimedDeliveryJob,
        reason: &str,
    ) -> AppResult<()> {
        let job_uuid = parse_job_id(job)?;

        let result = sqlx::query(
            r#"
            UPDATE webhook_delivery_jobs
            SET
                status = 'abandoned',
                leased_by = NULL,
                lease_token = NULL,
                lease_expires_at = NULL,
                last_error = $4,
                updated_at = now()
            WHERE id = $1
              AND leased_by = $2
              AND lease_token = $3
              AND status = 'leased'
            "#,
        )
        .bind(job_uuid)
        .bind(worker_id)
        .bind(job.lease_token.as_str())
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to abandon webhook delivery job '{}' for worker '{worker_id}': {error}",
                job.job_id
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(lease_conflict(job, worker_id));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
