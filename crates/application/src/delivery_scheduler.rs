use std::sync::Arc;
use std::time::Duration;

use courier_core::{AppError, AppResult, DeliveryAttemptId};

use crate::delivery_ports::{ClaimedDeliveryJob, DeliveryJobQueue};
use crate::retry_policy::{RetryDecision, RetryPolicy};
use crate::webhook_delivery_service::{DeliveryReport, WebhookDeliveryService};

/// How one claimed job left the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResolution {
    /// The delivery reached a final state.
    Completed(DeliveryReport),
    /// The job will run again after the delay.
    Rescheduled {
        /// Report of the failed invocation, when one ran.
        report: Option<DeliveryReport>,
        /// Delay before the next claim.
        delay: Duration,
        /// Why the invocation did not finish the job.
        reason: String,
    },
    /// The job was dropped without a final delivery state.
    Abandoned {
        /// Why the job was dropped.
        reason: String,
    },
}

impl JobResolution {
    /// Returns stable label value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed(_) => "completed",
            Self::Rescheduled { .. } => "rescheduled",
            Self::Abandoned { .. } => "abandoned",
        }
    }
}

/// Retry coordinator between the delivery queue and the delivery service.
///
/// The delivery service never retries on its own; this scheduler applies the
/// retry policy to each invocation and updates the queue accordingly.
#[derive(Clone)]
pub struct DeliveryScheduler {
    delivery_service: WebhookDeliveryService,
    queue: Arc<dyn DeliveryJobQueue>,
    retry_policy: RetryPolicy,
}

impl DeliveryScheduler {
    /// Creates a delivery scheduler.
    #[must_use]
    pub fn new(
        delivery_service: WebhookDeliveryService,
        queue: Arc<dyn DeliveryJobQueue>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            delivery_service,
            queue,
            retry_policy,
        }
    }

    /// Queues one attempt for delivery.
    pub async fn schedule(&self, attempt_id: DeliveryAttemptId) -> AppResult<()> {
        self.queue.enqueue(attempt_id).await
    }

    /// Claims due delivery jobs for one worker.
    pub async fn claim_jobs_for_worker(
        &self,
        worker_id: &str,
        limit: usize,
        lease_seconds: u32,
    ) -> AppResult<Vec<ClaimedDeliveryJob>> {
        if worker_id.trim().is_empty() {
            return Err(AppError::Validation(
                "worker_id must not be empty".to_owned(),
            ));
        }

        if limit == 0 {
            return Err(AppError::Validation(
                "limit must be greater than zero".to_owned(),
            ));
        }

        if lease_seconds == 0 {
            return Err(AppError::Validation(
                "lease_seconds must be greater than zero".to_owned(),
            ));
        }

        self.queue
            .claim_due_jobs(worker_id, limit, lease_seconds)
            .await
    }

    /// Runs one claimed job and settles it in the queue.
    pub async fn run_claimed_job(
        &self,
        worker_id: &str,
        job: ClaimedDeliveryJob,
    ) -> AppResult<JobResolution> {
        if worker_id.trim().is_empty() {
            return Err(AppError::Validation(
                "worker_id must not be empty".to_owned(),
            ));
        }

        if job.lease_token.trim().is_empty() {
            return Err(AppError::Validation(
                "claimed delivery job lease_token must not be empty".to_owned(),
            ));
        }

        let resolution = match self.delivery_service.deliver_attempt(job.attempt_id).await {
            Ok(report) => match self.retry_policy.decide(&report) {
                RetryDecision::Stop => JobResolution::Completed(report),
                RetryDecision::RetryAfter(delay) => JobResolution::Rescheduled {
                    reason: format!(
                        "delivery attempt {} failed on invocation {}",
                        report.attempt_id, report.attempt_count
                    ),
                    report: Some(report),
                    delay,
                },
            },
            Err(error @ (AppError::NotFound(_) | AppError::Validation(_))) => {
                JobResolution::Abandoned {
                    reason: error.to_string(),
                }
            }
            Err(error) if job.claim_count >= self.retry_policy.max_attempts() => {
                JobResolution::Abandoned {
                    reason: format!(
                        "giving up after {} claims: {error}",
                        job.claim_count
                    ),
                }
            }
            Err(error) => JobResolution::Rescheduled {
                report: None,
                delay: self.retry_policy.backoff_delay(job.claim_count),
                reason: error.to_string(),
            },
        };

        let resolution = match resolution {
            JobResolution::Abandoned { reason } => JobResolution::Abandoned {
                reason: self.record_abandonment(job.attempt_id, reason).await,
            },
            other => other,
        };

        self.settle(worker_id, &job, &resolution).await?;
        Ok(resolution)
    }

    /// Stores the abandonment reason on the attempt, when it can be loaded.
    async fn record_abandonment(&self, attempt_id: DeliveryAttemptId, reason: String) -> String {
        match self
            .delivery_service
            .fail_attempt(attempt_id, reason.as_str())
            .await
        {
            Ok(_) => reason,
            Err(error) => format!("{reason}; attempt not updated: {error}"),
        }
    }

    async fn settle(
        &self,
        worker_id: &str,
        job: &ClaimedDeliveryJob,
        resolution: &JobResolution,
    ) -> AppResult<()> {
        match resolution {
            JobResolution::Completed(_) => self.queue.complete_job(worker_id, job).await,
            JobResolution::Rescheduled { delay, reason, .. } => {
                self.queue
                    .retry_job_later(worker_id, job, *delay, reason.as_str())
                    .await
            }
            JobResolution::Abandoned { reason } => {
                self.queue
                    .abandon_job(worker_id, job, reason.as_str())
                    .await
            }
        }
    }
}
