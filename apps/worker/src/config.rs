use std::env;
use std::str::FromStr;
use std::time::Duration;

use courier_core::{AppError, AppResult};
use courier_infrastructure::DEFAULT_WEBHOOK_TIMEOUT;

/// Shortest lease that leaves room for one full send plus the save after it.
pub const MIN_LEASE_SECONDS: u64 = DEFAULT_WEBHOOK_TIMEOUT.as_secs() * 2;

/// Worker runtime settings read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub database_url: String,
    pub secret_encryption_key: String,
    pub worker_id: String,
    pub claim_limit: usize,
    pub lease_seconds: u32,
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    pub migrate_on_start: bool,
}

impl WorkerConfig {
    pub fn load() -> AppResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let database_url = required_env(&lookup, "DATABASE_URL")?;
        let secret_encryption_key = required_env(&lookup, "WEBHOOK_SECRET_ENCRYPTION_KEY")?;
        let worker_id = lookup("WORKER_ID")
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| format!("worker-{}", std::process::id()));
        let claim_limit = parse_env(&lookup, "WORKER_CLAIM_LIMIT", 10_usize)?;
        let lease_seconds = parse_env(&lookup, "WORKER_LEASE_SECONDS", 60_u32)?;
        let poll_interval_ms = parse_env(&lookup, "WORKER_POLL_INTERVAL_MS", 1500_u64)?;
        let max_attempts = parse_env(&lookup, "WEBHOOK_MAX_ATTEMPTS", 5_u32)?;
        let retry_base_delay_seconds =
            parse_env(&lookup, "WEBHOOK_RETRY_BASE_DELAY_SECONDS", 1_u64)?;
        let retry_max_delay_seconds =
            parse_env(&lookup, "WEBHOOK_RETRY_MAX_DELAY_SECONDS", 600_u64)?;
        let migrate_on_start = parse_env(&lookup, "WORKER_MIGRATE_ON_START", false)?;

        if claim_limit == 0 {
            return Err(AppError::Validation(
                "WORKER_CLAIM_LIMIT must be greater than zero".to_owned(),
            ));
        }

        if u64::from(lease_seconds) < MIN_LEASE_SECONDS {
            return Err(AppError::Validation(format!(
                "WORKER_LEASE_SECONDS must be at least {MIN_LEASE_SECONDS}, twice the {}s webhook timeout",
                DEFAULT_WEBHOOK_TIMEOUT.as_secs()
            )));
        }

        if poll_interval_ms == 0 {
            return Err(AppError::Validation(
                "WORKER_POLL_INTERVAL_MS must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            database_url,
            secret_encryption_key,
            worker_id,
            claim_limit,
            lease_seconds,
            poll_interval_ms,
            max_attempts,
            retry_base_delay: Duration::from_secs(retry_base_delay_seconds),
            retry_max_delay: Duration::from_secs(retry_max_delay_seconds),
            migrate_on_start,
        })
    }
}

fn required_env(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> AppResult<String> {
    lookup(name)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| AppError::Validation(format!("{name} is required")))
}

fn parse_env<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> AppResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(value) => value.trim().parse::<T>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        None => Ok(default),
    }
}
