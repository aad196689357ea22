use std::time::Duration;

use async_trait::async_trait;
use courier_core::{AppResult, DeliveryAttemptId};

/// Delivery job leased to one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedDeliveryJob {
    /// Queue job identifier.
    pub job_id: String,
    /// Delivery attempt to run.
    pub attempt_id: DeliveryAttemptId,
    /// Lease token proving ownership of the claim.
    pub lease_token: String,
    /// Number of times this job has been claimed, including this claim.
    pub claim_count: u32,
}

/// Queue port that invokes deliveries and re-invokes them on retry.
///
/// At most one lease exists per job, so one attempt never has two
/// invocations in flight.
#[async_trait]
pub trait DeliveryJobQueue: Send + Sync {
    /// Enqueues one attempt for immediate delivery.
    async fn enqueue(&self, attempt_id: DeliveryAttemptId) -> AppResult<()>;

    /// Claims jobs whose run time has passed, leasing them to one worker.
    async fn claim_due_jobs(
        &self,
        worker_id: &str,
        limit: usize,
        lease_seconds: u32,
    ) -> AppResult<Vec<ClaimedDeliveryJob>>;

    /// Marks one leased job as finished.
    async fn complete_job(&self, worker_id: &str, job: &ClaimedDeliveryJob) -> AppResult<()>;

    /// Releases one leased job to run again after a delay.
    async fn retry_job_later(
        &self,
        worker_id: &str,
        job: &ClaimedDeliveryJob,
        delay: Duration,
        reason: &str,
    ) -> AppResult<()>;

    /// Stops one leased job permanently.
    async fn abandon_job(
        &self,
        worker_id: &str,
        job: &ClaimedDeliveryJob,
        reason: &str,
    ) -> AppResult<()>;
}
