use std::time::Duration;

use chrono::{Duration as ChronoDuration, NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Job, NewJob};
use crate::schema::jobs;

pub const STATUS_QUEUED: &str = "queued";
pub const STATUS_PROCESSING: &str = "processing";
pub const STATUS_SUCCEEDED: &str = "succeeded";
pub const STATUS_FAILED: &str = "failed";

pub const JOB_DELIVER_SIGNING_LINK: &str = "deliver-signing-link";
pub const JOB_DELIVER_SIGNING_OTP: &str = "deliver-signing-otp";

/// Outbound message for the external email/SMS channel. Both variants carry
/// a live credential, so the payload is scrubbed once delivery succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Delivery {
    SigningLink {
        contract_id: Uuid,
        signer_id: Uuid,
        recipient: String,
        email: Option<String>,
        phone: Option<String>,
        contract_title: String,
        link: String,
    },
    SigningOtp {
        contract_id: Uuid,
        signer_id: Uuid,
        recipient: String,
        email: Option<String>,
        phone: Option<String>,
        code: String,
    },
}

impl Delivery {
    pub fn job_type(&self) -> &'static str {
        match self {
            Delivery::SigningLink { .. } => JOB_DELIVER_SIGNING_LINK,
            Delivery::SigningOtp { .. } => JOB_DELIVER_SIGNING_OTP,
        }
    }

    pub fn signer_id(&self) -> Uuid {
        match self {
            Delivery::SigningLink { signer_id, .. } | Delivery::SigningOtp { signer_id, .. } => {
                *signer_id
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum JobQueueError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

pub type JobQueueResult<T> = Result<T, JobQueueError>;

pub fn enqueue_job(
    conn: &mut PgConnection,
    job_type: &str,
    payload: Value,
    run_after: Option<NaiveDateTime>,
) -> JobQueueResult<Job> {
    let new_job = NewJob {
        id: Uuid::new_v4(),
        job_type: job_type.to_string(),
        payload,
        status: STATUS_QUEUED.to_string(),
        run_after: run_after.unwrap_or_else(|| Utc::now().naive_utc()),
    };

    let job = diesel::insert_into(jobs::table)
        .values(&new_job)
        .get_result(conn)?;
    Ok(job)
}

pub fn reserve_job(conn: &mut PgConnection, job_types: &[&str]) -> JobQueueResult<Option<Job>> {
    let now = Utc::now().naive_utc();

    conn.transaction::<Option<Job>, diesel::result::Error, _>(|conn| {
        let job_opt = jobs::table
            .filter(jobs::status.eq(STATUS_QUEUED))
            .filter(jobs::run_after.le(now))
            .filter(jobs::job_type.eq_any(job_types))
            .order(jobs::run_after.asc())
            .for_update()
            .skip_locked()
            .first::<Job>(conn)
            .optional()?;

        match job_opt {
            Some(job) => diesel::update(jobs::table.find(job.id))
                .set((
                    jobs::status.eq(STATUS_PROCESSING),
                    jobs::attempts.eq(job.attempts + 1),
                    jobs::updated_at.eq(now),
                ))
                .get_result::<Job>(conn)
                .map(Some),
            None => Ok(None),
        }
    })
    .map_err(JobQueueError::from)
}

/// Marks the job done and drops its payload.
pub fn mark_job_succeeded(conn: &mut PgConnection, job_id: Uuid) -> JobQueueResult<()> {
    diesel::update(jobs::table.find(job_id))
        .set((
            jobs::status.eq(STATUS_SUCCEEDED),
            jobs::payload.eq(json!({ "scrubbed": true })),
            jobs::last_error.eq::<Option<String>>(None),
            jobs::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)?;
    Ok(())
}

pub fn retry_job_after(
    conn: &mut PgConnection,
    job_id: Uuid,
    delay: Duration,
    error_message: &str,
) -> JobQueueResult<()> {
    let next_run = Utc::now()
        + ChronoDuration::from_std(delay).unwrap_or_else(|_| ChronoDuration::seconds(30));

    diesel::update(jobs::table.find(job_id))
        .set((
            jobs::status.eq(STATUS_QUEUED),
            jobs::run_after.eq(next_run.naive_utc()),
            jobs::last_error.eq(Some(error_message.to_string())),
            jobs::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)?;
    Ok(())
}

pub fn mark_job_failed(
    conn: &mut PgConnection,
    job_id: Uuid,
    error_message: &str,
) -> JobQueueResult<()> {
    diesel::update(jobs::table.find(job_id))
        .set((
            jobs::status.eq(STATUS_FAILED),
            jobs::payload.eq(json!({ "scrubbed": true })),
            jobs::last_error.eq(Some(error_message.to_string())),
            jobs::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deliveries_are_tagged_by_kind() {
        let delivery = Delivery::SigningOtp {
            contract_id: Uuid::nil(),
            signer_id: Uuid::nil(),
            recipient: "Thandi".into(),
            email: Some("thandi@example.co.za".into()),
            phone: None,
            code: "123456".into(),
        };
        let value = serde_json::to_value(&delivery).unwrap();
        assert_eq!(value["kind"], "signing_otp");
        assert_eq!(delivery.job_type(), JOB_DELIVER_SIGNING_OTP);

        let parsed: Delivery = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, delivery);
    }
}
