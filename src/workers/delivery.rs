use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{info, warn};

use crate::{
    jobs::{Delivery, JOB_DELIVER_SIGNING_LINK, JOB_DELIVER_SIGNING_OTP},
    models::Job,
    state::AppState,
};

use super::{JobExecution, JobHandler};

pub const MAX_ATTEMPTS: i32 = 5;
const RETRY_STEP: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Hands signing links and OTP codes to the external email/SMS channel by
/// POSTing the delivery as JSON to `DELIVERY_WEBHOOK_URL`.
pub struct DeliverJob {
    job_type: &'static str,
    client: Client,
}

impl DeliverJob {
    pub fn signing_link() -> Self {
        Self::new(JOB_DELIVER_SIGNING_LINK)
    }

    pub fn signing_otp() -> Self {
        Self::new(JOB_DELIVER_SIGNING_OTP)
    }

    fn new(job_type: &'static str) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { job_type, client }
    }
}

/// Linear backoff: 30s after the first attempt, 60s after the second, ...
fn retry_or_fail(attempts: i32, error: String) -> JobExecution {
    if attempts >= MAX_ATTEMPTS {
        JobExecution::Failed {
            error: format!("giving up after {attempts} attempts: {error}"),
        }
    } else {
        JobExecution::Retry {
            delay: RETRY_STEP * attempts.max(1) as u32,
            error,
        }
    }
}

fn outcome_for_status(status: StatusCode, attempts: i32) -> JobExecution {
    if status.is_success() {
        JobExecution::Success
    } else if status.is_client_error() {
        JobExecution::Failed {
            error: format!("delivery rejected with status {status}"),
        }
    } else {
        retry_or_fail(attempts, format!("delivery failed with status {status}"))
    }
}

#[async_trait]
impl JobHandler for DeliverJob {
    fn job_type(&self) -> &'static str {
        self.job_type
    }

    async fn handle(&self, state: Arc<AppState>, job: Job) -> JobExecution {
        let delivery: Delivery = match serde_json::from_value(job.payload.clone()) {
            Ok(delivery) => delivery,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid delivery payload: {err}"),
                }
            }
        };

        let Some(webhook) = state.config.delivery_webhook_url.as_deref() else {
            return JobExecution::Failed {
                error: "DELIVERY_WEBHOOK_URL is not configured".into(),
            };
        };

        match self.client.post(webhook).json(&delivery).send().await {
            Ok(response) => {
                let status = response.status();
                let outcome = outcome_for_status(status, job.attempts);
                match &outcome {
                    JobExecution::Success => info!(
                        job_id = %job.id,
                        signer_id = %delivery.signer_id(),
                        "delivery accepted"
                    ),
                    _ => warn!(job_id = %job.id, %status, "delivery webhook refused request"),
                }
                outcome
            }
            Err(err) => {
                warn!(job_id = %job.id, error = %err, "delivery request failed");
                retry_or_fail(job.attempts, err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_and_client_errors_are_final() {
        assert!(matches!(
            outcome_for_status(StatusCode::ACCEPTED, 1),
            JobExecution::Success
        ));
        assert!(matches!(
            outcome_for_status(StatusCode::UNPROCESSABLE_ENTITY, 1),
            JobExecution::Failed { .. }
        ));
    }

    #[test]
    fn server_errors_back_off_linearly() {
        match outcome_for_status(StatusCode::BAD_GATEWAY, 2) {
            JobExecution::Retry { delay, .. } => assert_eq!(delay, Duration::from_secs(60)),
            other => panic!("expected retry, got {other:?}"),
        }
    }

    #[test]
    fn stops_retrying_at_the_attempt_limit() {
        assert!(matches!(
            retry_or_fail(MAX_ATTEMPTS, "timeout".into()),
            JobExecution::Failed { .. }
        ));
    }
}
