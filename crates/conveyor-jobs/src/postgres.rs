//! Postgres-backed job store.
//!
//! Every transition is a conditional `UPDATE ... WHERE` whose predicate
//! encodes the required invariant; the lease claim uses a
//! `FOR UPDATE SKIP LOCKED` CTE so two concurrent workers never lease the
//! same row. DLQ-entry writes share a transaction with the state change.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{JobError, JobResult};
use crate::job::{DlqEntry, JobId, JobRecord, JobState, NewJob};
use crate::store::{JobFilter, JobStore, RetryState, StateCounts};
use conveyor_core::PageRequest;

const JOB_COLUMNS: &str = "job_id, queue_name, job_type, payload, idempotency_key, state, \
     max_attempts, initial_delay_ms, backoff_multiplier, max_delay_ms, jitter, \
     attempt_count, retry_count, next_run_at, available_at, lease_owner, lease_expires_at, \
     last_error, traceparent, created_at, updated_at, started_at, completed_at";

/// Creates the Postgres connection pool.
pub async fn create_pool(
    url: &str,
    max_connections: u32,
    min_connections: u32,
    connect_timeout: Duration,
) -> JobResult<PgPool> {
    info!("Connecting to Postgres...");
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(min_connections)
        .acquire_timeout(connect_timeout)
        .connect(url)
        .await
        .map_err(|e| {
            warn!("Failed to connect to Postgres: {}", e);
            JobError::Sqlx(e)
        })?;
    info!("Postgres connection pool established");
    Ok(pool)
}

/// Runs the embedded migrations.
pub async fn run_migrations(pool: &PgPool) -> JobResult<()> {
    info!("Running database migrations...");
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .map_err(|e| JobError::Internal(format!("migration failed: {}", e)))?;
    info!("Database migrations completed");
    Ok(())
}

/// Postgres implementation of [`JobStore`].
pub struct PostgresJobStore {
    pool: PgPool,
}

impl PostgresJobStore {
    /// Wraps an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23505"),
        _ => false,
    }
}

fn parse_state(raw: &str) -> JobResult<JobState> {
    raw.parse::<JobState>().map_err(JobError::Internal)
}

fn job_from_row(row: &PgRow) -> JobResult<JobRecord> {
    let state: String = row.try_get("state")?;
    Ok(JobRecord {
        job_id: JobId::from_string(row.try_get::<String, _>("job_id")?),
        queue_name: row.try_get("queue_name")?,
        job_type: row.try_get("job_type")?,
        payload: row.try_get("payload")?,
        idempotency_key: row.try_get("idempotency_key")?,
        state: parse_state(&state)?,
        max_attempts: row.try_get::<i32, _>("max_attempts")? as u32,
        initial_delay_ms: row.try_get::<i64, _>("initial_delay_ms")? as u64,
        backoff_multiplier: row.try_get("backoff_multiplier")?,
        max_delay_ms: row.try_get::<i64, _>("max_delay_ms")? as u64,
        jitter: row.try_get("jitter")?,
        attempt_count: row.try_get::<i32, _>("attempt_count")? as u32,
        retry_count: row.try_get::<i32, _>("retry_count")? as u32,
        next_run_at: row.try_get("next_run_at")?,
        available_at: row.try_get("available_at")?,
        lease_owner: row.try_get("lease_owner")?,
        lease_expires_at: row.try_get("lease_expires_at")?,
        last_error: row.try_get("last_error")?,
        traceparent: row.try_get("traceparent")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

fn dlq_from_row(row: &PgRow) -> JobResult<DlqEntry> {
    Ok(DlqEntry {
        job_id: JobId::from_string(row.try_get::<String, _>("job_id")?),
        reason: row.try_get("reason")?,
        created_at: row.try_get("created_at")?,
    })
}

fn chrono_from_std(d: Duration) -> ChronoDuration {
    ChronoDuration::from_std(d).unwrap_or_else(|_| ChronoDuration::zero())
}

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn ping(&self) -> JobResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_job(&self, job_id: JobId, job: NewJob) -> JobResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO jobs (
                job_id, queue_name, job_type, payload, idempotency_key, state,
                max_attempts, initial_delay_ms, backoff_multiplier, max_delay_ms, jitter,
                next_run_at, available_at, traceparent
            )
            VALUES ($1, $2, $3, $4, $5, 'PENDING', $6, $7, $8, $9, $10, NOW(), NOW(), $11)
            "#,
        )
        .bind(job_id.as_str())
        .bind(&job.queue_name)
        .bind(&job.job_type)
        .bind(&job.payload)
        .bind(&job.idempotency_key)
        .bind(job.policy.max_attempts as i32)
        .bind(job.policy.initial_delay_ms as i64)
        .bind(job.policy.backoff_multiplier)
        .bind(job.policy.max_delay_ms as i64)
        .bind(job.policy.jitter)
        .bind(&job.traceparent)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(JobError::Conflict {
                queue: job.queue_name,
                key: job.idempotency_key,
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_job(&self, job_id: &JobId) -> JobResult<Option<JobRecord>> {
        let row = sqlx::query(&format!("SELECT {} FROM jobs WHERE job_id = $1", JOB_COLUMNS))
            .bind(job_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| job_from_row(&r)).transpose()
    }

    async fn get_job_by_idempotency_key(
        &self,
        queue_name: &str,
        key: &str,
    ) -> JobResult<Option<JobRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM jobs WHERE queue_name = $1 AND idempotency_key = $2",
            JOB_COLUMNS
        ))
        .bind(queue_name)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| job_from_row(&r)).transpose()
    }

    async fn lease_next_job(
        &self,
        queue_name: &str,
        worker_id: &str,
        now: DateTime<Utc>,
        lease_for: Duration,
    ) -> JobResult<Option<JobId>> {
        let expires_at = now + chrono_from_std(lease_for);
        let row = sqlx::query(
            r#"
            WITH candidate AS (
                SELECT job_id
                FROM jobs
                WHERE queue_name = $1
                    AND state = 'PENDING'
                    AND next_run_at <= $2
                ORDER BY next_run_at ASC, created_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            UPDATE jobs j
            SET state = 'IN_PROGRESS',
                attempt_count = attempt_count + 1,
                lease_owner = $3,
                lease_expires_at = $4,
                started_at = COALESCE(started_at, $2)
            FROM candidate
            WHERE j.job_id = candidate.job_id
            RETURNING j.job_id
            "#,
        )
        .bind(queue_name)
        .bind(now)
        .bind(worker_id)
        .bind(expires_at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| JobId::from_string(r.get::<String, _>("job_id"))))
    }

    async fn acquire_lease(
        &self,
        job_id: &JobId,
        worker_id: &str,
        now: DateTime<Utc>,
        lease_for: Duration,
    ) -> JobResult<bool> {
        let expires_at = now + chrono_from_std(lease_for);
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'IN_PROGRESS',
                attempt_count = attempt_count + 1,
                lease_owner = $1,
                lease_expires_at = $2,
                started_at = COALESCE(started_at, NOW())
            WHERE job_id = $3
                AND state = 'PENDING'
                AND (lease_expires_at IS NULL OR lease_expires_at <= $4)
            "#,
        )
        .bind(worker_id)
        .bind(expires_at)
        .bind(job_id.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn renew_lease(
        &self,
        job_id: &JobId,
        worker_id: &str,
        extend_by: Duration,
    ) -> JobResult<bool> {
        let expires_at = Utc::now() + chrono_from_std(extend_by);
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET lease_expires_at = $1
            WHERE job_id = $2
                AND state = 'IN_PROGRESS'
                AND lease_owner = $3
            "#,
        )
        .bind(expires_at)
        .bind(job_id.as_str())
        .bind(worker_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_job_succeeded(&self, job_id: &JobId, worker_id: &str) -> JobResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'COMPLETED',
                lease_owner = NULL,
                lease_expires_at = NULL,
                last_error = '',
                completed_at = NOW()
            WHERE job_id = $1
                AND state = 'IN_PROGRESS'
                AND lease_owner = $2
            "#,
        )
        .bind(job_id.as_str())
        .bind(worker_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_job_failed(
        &self,
        job_id: &JobId,
        worker_id: &str,
        last_error: &str,
    ) -> JobResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'FAILED',
                lease_owner = NULL,
                lease_expires_at = NULL,
                last_error = $3
            WHERE job_id = $1
                AND state = 'IN_PROGRESS'
                AND lease_owner = $2
            "#,
        )
        .bind(job_id.as_str())
        .bind(worker_id)
        .bind(last_error)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_job_terminal(
        &self,
        job_id: &JobId,
        worker_id: &str,
        reason: &str,
    ) -> JobResult<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'DLQ',
                lease_owner = NULL,
                lease_expires_at = NULL,
                last_error = $3
            WHERE job_id = $1
                AND state = 'IN_PROGRESS'
                AND lease_owner = $2
            "#,
        )
        .bind(job_id.as_str())
        .bind(worker_id)
        .bind(reason)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() != 1 {
            tx.commit().await?;
            return Ok(false);
        }

        let reason = if reason.is_empty() { "terminal failure" } else { reason };
        sqlx::query(
            r#"
            INSERT INTO dlq_entries (job_id, reason)
            VALUES ($1, $2)
            ON CONFLICT (job_id) DO UPDATE
            SET reason = EXCLUDED.reason, created_at = NOW()
            "#,
        )
        .bind(job_id.as_str())
        .bind(reason)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn get_retry_state(&self, job_id: &JobId) -> JobResult<RetryState> {
        let row = sqlx::query(
            r#"
            SELECT queue_name, retry_count, max_attempts, initial_delay_ms,
                   backoff_multiplier, max_delay_ms, jitter, traceparent
            FROM jobs
            WHERE job_id = $1
            "#,
        )
        .bind(job_id.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

        Ok(RetryState {
            job_id: job_id.clone(),
            queue_name: row.try_get("queue_name")?,
            retry_count: row.try_get::<i32, _>("retry_count")? as u32,
            policy: crate::retry::RetryPolicy {
                max_attempts: row.try_get::<i32, _>("max_attempts")? as u32,
                initial_delay_ms: row.try_get::<i64, _>("initial_delay_ms")? as u64,
                backoff_multiplier: row.try_get("backoff_multiplier")?,
                max_delay_ms: row.try_get::<i64, _>("max_delay_ms")? as u64,
                jitter: row.try_get("jitter")?,
            },
            traceparent: row.try_get("traceparent")?,
        })
    }

    async fn update_retry_schedule(
        &self,
        job_id: &JobId,
        retry_count: u32,
        next_run_at: DateTime<Utc>,
    ) -> JobResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'RETRYING',
                retry_count = $1,
                next_run_at = $2
            WHERE job_id = $3
                AND state = 'FAILED'
            "#,
        )
        .bind(retry_count as i32)
        .bind(next_run_at)
        .bind(job_id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_exhausted(&self, job_id: &JobId, reason: &str) -> JobResult<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'DLQ',
                last_error = $2
            WHERE job_id = $1
                AND state = 'FAILED'
            "#,
        )
        .bind(job_id.as_str())
        .bind(reason)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() != 1 {
            tx.commit().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO dlq_entries (job_id, reason)
            VALUES ($1, $2)
            ON CONFLICT (job_id) DO UPDATE
            SET reason = EXCLUDED.reason, created_at = NOW()
            "#,
        )
        .bind(job_id.as_str())
        .bind(reason)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn list_failed(&self, limit: i64) -> JobResult<Vec<JobId>> {
        let rows = sqlx::query(
            r#"
            SELECT job_id
            FROM jobs
            WHERE state = 'FAILED'
            ORDER BY updated_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| JobId::from_string(r.get::<String, _>("job_id")))
            .collect())
    }

    async fn list_due_retries(&self, now: DateTime<Utc>, limit: i64) -> JobResult<Vec<JobId>> {
        let rows = sqlx::query(
            r#"
            SELECT job_id
            FROM jobs
            WHERE state = 'RETRYING' AND next_run_at <= $1
            ORDER BY next_run_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| JobId::from_string(r.get::<String, _>("job_id")))
            .collect())
    }

    async fn mark_retry_enqueued(&self, job_id: &JobId) -> JobResult<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'PENDING',
                available_at = NOW()
            WHERE job_id = $1
                AND state = 'RETRYING'
            "#,
        )
        .bind(job_id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_expired_leases(&self, now: DateTime<Utc>, limit: i64) -> JobResult<Vec<JobId>> {
        let rows = sqlx::query(
            r#"
            SELECT job_id
            FROM jobs
            WHERE state = 'IN_PROGRESS'
                AND lease_expires_at IS NOT NULL
                AND lease_expires_at <= $1
            ORDER BY lease_expires_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| JobId::from_string(r.get::<String, _>("job_id")))
            .collect())
    }

    async fn reset_lease(&self, job_id: &JobId) -> JobResult<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'PENDING',
                lease_owner = NULL,
                lease_expires_at = NULL,
                available_at = NOW()
            WHERE job_id = $1
                AND state = 'IN_PROGRESS'
            "#,
        )
        .bind(job_id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn retry_job(&self, job_id: &JobId) -> JobResult<()> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT state FROM jobs WHERE job_id = $1 FOR UPDATE")
            .bind(job_id.as_str())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        let state = parse_state(&row.get::<String, _>("state"))?;

        match state {
            JobState::Failed | JobState::Retrying => {
                sqlx::query(
                    r#"
                    UPDATE jobs
                    SET state = 'PENDING',
                        last_error = '',
                        next_run_at = NOW(),
                        available_at = NOW()
                    WHERE job_id = $1
                    "#,
                )
                .bind(job_id.as_str())
                .execute(&mut *tx)
                .await?;
            }
            JobState::Dlq | JobState::Dead => {
                // Retry from the dead-letter states is a replay.
                sqlx::query("DELETE FROM dlq_entries WHERE job_id = $1")
                    .bind(job_id.as_str())
                    .execute(&mut *tx)
                    .await?;
                sqlx::query(
                    r#"
                    UPDATE jobs
                    SET state = 'PENDING',
                        attempt_count = 0,
                        retry_count = 0,
                        last_error = '',
                        next_run_at = NOW(),
                        available_at = NOW()
                    WHERE job_id = $1
                    "#,
                )
                .bind(job_id.as_str())
                .execute(&mut *tx)
                .await?;
            }
            from => {
                return Err(JobError::InvalidTransition {
                    job_id: job_id.to_string(),
                    from: from.to_string(),
                    to: JobState::Pending.to_string(),
                });
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn dlq_job(&self, job_id: &JobId, reason: &str) -> JobResult<()> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT state FROM jobs WHERE job_id = $1 FOR UPDATE")
            .bind(job_id.as_str())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        let state = parse_state(&row.get::<String, _>("state"))?;

        match state {
            JobState::Pending | JobState::InProgress | JobState::Failed | JobState::Retrying => {}
            from => {
                return Err(JobError::InvalidTransition {
                    job_id: job_id.to_string(),
                    from: from.to_string(),
                    to: JobState::Dlq.to_string(),
                });
            }
        }

        sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'DLQ',
                lease_owner = NULL,
                lease_expires_at = NULL,
                last_error = $2
            WHERE job_id = $1
            "#,
        )
        .bind(job_id.as_str())
        .bind(reason)
        .execute(&mut *tx)
        .await?;

        let reason = if reason.is_empty() { "terminal failure" } else { reason };
        sqlx::query(
            r#"
            INSERT INTO dlq_entries (job_id, reason)
            VALUES ($1, $2)
            ON CONFLICT (job_id) DO UPDATE
            SET reason = EXCLUDED.reason, created_at = NOW()
            "#,
        )
        .bind(job_id.as_str())
        .bind(reason)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn replay_dlq(&self, job_id: &JobId) -> JobResult<()> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM dlq_entries WHERE job_id = $1")
            .bind(job_id.as_str())
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(JobError::NotFound(job_id.to_string()));
        }

        sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'PENDING',
                attempt_count = 0,
                retry_count = 0,
                last_error = '',
                lease_owner = NULL,
                lease_expires_at = NULL,
                next_run_at = NOW(),
                available_at = NOW()
            WHERE job_id = $1
            "#,
        )
        .bind(job_id.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_dlq(&self, page: PageRequest) -> JobResult<(Vec<DlqEntry>, u64)> {
        let total: i64 = sqlx::query("SELECT COUNT(1) AS n FROM dlq_entries")
            .fetch_one(&self.pool)
            .await?
            .get("n");

        let rows = sqlx::query(
            r#"
            SELECT job_id, reason, created_at
            FROM dlq_entries
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(page.limit as i64)
        .bind(page.offset as i64)
        .fetch_all(&self.pool)
        .await?;

        let entries = rows
            .iter()
            .map(dlq_from_row)
            .collect::<JobResult<Vec<_>>>()?;
        Ok((entries, total as u64))
    }

    async fn get_dlq_entry(&self, job_id: &JobId) -> JobResult<Option<DlqEntry>> {
        let row = sqlx::query("SELECT job_id, reason, created_at FROM dlq_entries WHERE job_id = $1")
            .bind(job_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| dlq_from_row(&r)).transpose()
    }

    async fn stats(&self) -> JobResult<StateCounts> {
        let rows = sqlx::query("SELECT state, COUNT(1) AS n FROM jobs GROUP BY state")
            .fetch_all(&self.pool)
            .await?;
        let mut counts = StateCounts::default();
        for row in rows {
            let state = parse_state(&row.get::<String, _>("state"))?;
            let n: i64 = row.get("n");
            counts.total += n as u64;
            counts.by_state.insert(state, n as u64);
        }
        Ok(counts)
    }

    async fn query_jobs(
        &self,
        filter: &JobFilter,
        page: PageRequest,
    ) -> JobResult<(Vec<JobRecord>, u64)> {
        fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &JobFilter) {
            builder.push(" WHERE 1=1");
            if let Some(queue) = &filter.queue_name {
                builder.push(" AND queue_name = ").push_bind(queue.clone());
            }
            if let Some(state) = filter.state {
                builder.push(" AND state = ").push_bind(state.as_str());
            }
            if let Some(job_type) = &filter.job_type {
                builder.push(" AND job_type = ").push_bind(job_type.clone());
            }
            if let Some(search) = &filter.search {
                let pattern = format!("%{}%", search);
                builder
                    .push(" AND (job_id ILIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR idempotency_key ILIKE ")
                    .push_bind(pattern)
                    .push(")");
            }
        }

        let mut count_builder = QueryBuilder::new("SELECT COUNT(1) AS n FROM jobs");
        push_filters(&mut count_builder, filter);
        let total: i64 = count_builder
            .build()
            .fetch_one(&self.pool)
            .await?
            .get("n");

        let mut list_builder = QueryBuilder::new(format!("SELECT {} FROM jobs", JOB_COLUMNS));
        push_filters(&mut list_builder, filter);
        list_builder
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(page.limit as i64)
            .push(" OFFSET ")
            .push_bind(page.offset as i64);

        let rows = list_builder.build().fetch_all(&self.pool).await?;
        let jobs = rows
            .iter()
            .map(job_from_row)
            .collect::<JobResult<Vec<_>>>()?;
        Ok((jobs, total as u64))
    }

    async fn get_traceparent(&self, job_id: &JobId) -> JobResult<Option<String>> {
        let row = sqlx::query("SELECT traceparent FROM jobs WHERE job_id = $1")
            .bind(job_id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        Ok(row.get("traceparent"))
    }
}
