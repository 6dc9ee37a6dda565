use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use super::{fmt_ts, get_enum, get_json, get_ts, new_id, to_json, SqliteStore};
use crate::error::{FolioError, FolioResult};
use crate::traits::JobStore;
use crate::types::{EnqueueOutcome, JobRecord, JobStatus, Stage, StagePayload};

const JOB_COLUMNS: &str = "id, stage, job_key, payload, status, attempts, max_attempts, run_after, \
     last_error, created_at, updated_at";

fn row_to_job(row: &Row<'_>) -> rusqlite::Result<JobRecord> {
    Ok(JobRecord {
        id: row.get(0)?,
        stage: get_enum(row, 1)?,
        job_key: row.get(2)?,
        payload: get_json(row, 3)?,
        status: get_enum(row, 4)?,
        attempts: row.get(5)?,
        max_attempts: row.get(6)?,
        run_after: get_ts(row, 7)?,
        last_error: row.get(8)?,
        created_at: get_ts(row, 9)?,
        updated_at: get_ts(row, 10)?,
    })
}

fn active_by_key(conn: &Connection, job_key: &str) -> FolioResult<Option<JobRecord>> {
    let job = conn
        .query_row(
            &format!(
                "SELECT {} FROM jobs WHERE job_key = ?1 AND status IN ('queued', 'running') \
                 LIMIT 1",
                JOB_COLUMNS
            ),
            params![job_key],
            row_to_job,
        )
        .optional()?;
    Ok(job)
}

fn job_by_id(conn: &Connection, job_id: &str) -> FolioResult<Option<JobRecord>> {
    let job = conn
        .query_row(
            &format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS),
            params![job_id],
            row_to_job,
        )
        .optional()?;
    Ok(job)
}

fn set_status(
    conn: &Connection,
    job_id: &str,
    status: JobStatus,
    error: Option<&str>,
) -> FolioResult<()> {
    let changed = conn.execute(
        "UPDATE jobs SET status = ?2, last_error = COALESCE(?3, last_error), updated_at = ?4 \
         WHERE id = ?1",
        params![job_id, status.to_string(), error, fmt_ts(&Utc::now())],
    )?;
    if changed == 0 {
        return Err(FolioError::queue(format!("Job not found: {}", job_id)));
    }
    Ok(())
}

#[async_trait]
impl JobStore for SqliteStore {
    async fn enqueue_job(
        &self,
        stage: Stage,
        payload: &StagePayload,
        max_attempts: u32,
    ) -> FolioResult<EnqueueOutcome> {
        let job_key = stage.job_key(&payload.document_id);
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        if let Some(existing) = active_by_key(&tx, &job_key)? {
            return Ok(EnqueueOutcome::AlreadyActive(existing));
        }

        let now = Utc::now();
        let job = JobRecord {
            id: new_id(),
            stage,
            job_key,
            payload: payload.clone(),
            status: JobStatus::Queued,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            run_after: now,
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        tx.execute(
            &format!(
                "INSERT INTO jobs ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                JOB_COLUMNS
            ),
            params![
                job.id,
                job.stage.to_string(),
                job.job_key,
                to_json(&job.payload)?,
                job.status.to_string(),
                job.attempts,
                job.max_attempts,
                fmt_ts(&job.run_after),
                job.last_error,
                fmt_ts(&job.created_at),
                fmt_ts(&job.updated_at),
            ],
        )?;
        tx.commit()?;

        Ok(EnqueueOutcome::Enqueued(job))
    }

    async fn claim_next(&self, stage: Stage, now: DateTime<Utc>) -> FolioResult<Option<JobRecord>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let next_id: Option<String> = tx
            .query_row(
                "SELECT id FROM jobs WHERE stage = ?1 AND status = 'queued' AND run_after <= ?2 \
                 ORDER BY run_after, created_at LIMIT 1",
                params![stage.to_string(), fmt_ts(&now)],
                |row| row.get(0),
            )
            .optional()?;
        let Some(job_id) = next_id else {
            return Ok(None);
        };

        tx.execute(
            "UPDATE jobs SET status = 'running', attempts = attempts + 1, updated_at = ?2 \
             WHERE id = ?1",
            params![job_id, fmt_ts(&Utc::now())],
        )?;
        let job = job_by_id(&tx, &job_id)?;
        tx.commit()?;

        Ok(job)
    }

    async fn complete_job(&self, job_id: &str) -> FolioResult<()> {
        let conn = self.conn()?;
        set_status(&conn, job_id, JobStatus::Completed, None)
    }

    async fn reschedule_job(
        &self,
        job_id: &str,
        run_after: DateTime<Utc>,
        error: &str,
    ) -> FolioResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE jobs SET status = 'queued', run_after = ?2, last_error = ?3, updated_at = ?4 \
             WHERE id = ?1",
            params![job_id, fmt_ts(&run_after), error, fmt_ts(&Utc::now())],
        )?;
        if changed == 0 {
            return Err(FolioError::queue(format!("Job not found: {}", job_id)));
        }
        Ok(())
    }

    async fn fail_job(&self, job_id: &str, error: &str) -> FolioResult<()> {
        let conn = self.conn()?;
        set_status(&conn, job_id, JobStatus::Failed, Some(error))
    }

    async fn get_job(&self, job_id: &str) -> FolioResult<Option<JobRecord>> {
        let conn = self.conn()?;
        job_by_id(&conn, job_id)
    }

    async fn active_job(&self, stage: Stage, document_id: &str) -> FolioResult<Option<JobRecord>> {
        let conn = self.conn()?;
        active_by_key(&conn, &stage.job_key(document_id))
    }

    async fn requeue_stale(&self) -> FolioResult<usize> {
        let conn = self.conn()?;
        let requeued = conn.execute(
            "UPDATE jobs SET status = 'queued', updated_at = ?1 WHERE status = 'running'",
            params![fmt_ts(&Utc::now())],
        )?;
        if requeued > 0 {
            info!(requeued, "Requeued jobs left running by a previous worker");
        }
        Ok(requeued)
    }
}
