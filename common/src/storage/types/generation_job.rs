use state_machines::state_machine;
use surrealdb::sql::Datetime as SurrealDatetime;
use uuid::Uuid;

use crate::{
    error::AppError, storage::db::SurrealDbClient, stored_object, utils::config::AppConfig,
};

use super::job_payload::JobPayload;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Default, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy)]
enum JobTransition {
    Lease,
    Complete,
    Fail,
    Requeue,
}

impl JobTransition {
    fn as_str(&self) -> &'static str {
        match self {
            JobTransition::Lease => "lease",
            JobTransition::Complete => "complete",
            JobTransition::Fail => "fail",
            JobTransition::Requeue => "requeue",
        }
    }
}

mod lifecycle {
    use super::state_machine;

    state_machine! {
        name: JobLifecycleMachine,
        initial: Pending,
        states: [Pending, Processing, Completed, Failed],
        events {
            lease {
                transition: { from: Pending, to: Processing }
            }
            complete {
                transition: { from: Processing, to: Completed }
            }
            fail {
                transition: { from: Processing, to: Failed }
            }
            requeue {
                transition: { from: Processing, to: Pending }
            }
        }
    }

    pub(super) fn pending() -> JobLifecycleMachine<(), Pending> {
        JobLifecycleMachine::new(())
    }
}

fn invalid_transition(status: &JobStatus, event: JobTransition) -> AppError {
    AppError::Validation(format!(
        "Invalid job transition: {} -> {}",
        status.as_str(),
        event.as_str()
    ))
}

fn compute_next_state(status: &JobStatus, event: JobTransition) -> Result<JobStatus, AppError> {
    use lifecycle::pending;
    match (status, event) {
        (JobStatus::Pending, JobTransition::Lease) => pending()
            .lease()
            .map(|_| JobStatus::Processing)
            .map_err(|_| invalid_transition(status, event)),
        (JobStatus::Processing, JobTransition::Complete) => pending()
            .lease()
            .map_err(|_| invalid_transition(status, event))?
            .complete()
            .map(|_| JobStatus::Completed)
            .map_err(|_| invalid_transition(status, event)),
        (JobStatus::Processing, JobTransition::Fail) => pending()
            .lease()
            .map_err(|_| invalid_transition(status, event))?
            .fail()
            .map(|_| JobStatus::Failed)
            .map_err(|_| invalid_transition(status, event)),
        (JobStatus::Processing, JobTransition::Requeue) => pending()
            .lease()
            .map_err(|_| invalid_transition(status, event))?
            .requeue()
            .map(|_| JobStatus::Pending)
            .map_err(|_| invalid_transition(status, event)),
        _ => Err(invalid_transition(status, event)),
    }
}

stored_object!(GenerationJob, "generation_job", {
    request_type: String,
    input_data: serde_json::Value,
    status: JobStatus,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error_message: Option<String>,
    attempts: u32,
    max_attempts: u32,
    #[serde(
        serialize_with = "serialize_option_datetime",
        deserialize_with = "deserialize_option_datetime",
        default
    )]
    processed_at: Option<DateTime<Utc>>
});

impl GenerationJob {
    pub fn new(payload: &JobPayload, max_attempts: u32) -> Self {
        Self::from_raw(payload.request_type(), payload.to_input_data(), max_attempts)
    }

    /// Builds a job from an unvalidated payload; validation happens at dispatch.
    pub fn from_raw(request_type: &str, input_data: serde_json::Value, max_attempts: u32) -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4().to_string(),
            request_type: request_type.to_string(),
            input_data,
            status: JobStatus::Pending,
            result: None,
            error_message: None,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            processed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    pub fn attempts_remaining(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempts)
    }

    pub async fn create_and_add_to_db(
        payload: &JobPayload,
        max_attempts: u32,
        db: &SurrealDbClient,
    ) -> Result<GenerationJob, AppError> {
        let job = Self::new(payload, max_attempts);
        db.store_item(job.clone()).await?;
        Ok(job)
    }

    /// Enqueues a job with the attempt ceiling from `job_max_attempts`.
    pub async fn enqueue(
        payload: &JobPayload,
        config: &AppConfig,
        db: &SurrealDbClient,
    ) -> Result<GenerationJob, AppError> {
        Self::create_and_add_to_db(payload, config.job_max_attempts, db).await
    }

    /// Oldest pending job, if any. Does not claim it.
    pub async fn find_pending(db: &SurrealDbClient) -> Result<Option<GenerationJob>, AppError> {
        let jobs: Vec<GenerationJob> = db
            .query(
                "SELECT * FROM type::table($table)
                 WHERE status = $pending
                 ORDER BY created_at ASC
                 LIMIT 1",
            )
            .bind(("table", Self::table_name()))
            .bind(("pending", JobStatus::Pending.as_str()))
            .await?
            .take(0)?;

        Ok(jobs.into_iter().next())
    }

    /// Loads the stored status and checks `event` against the lifecycle.
    /// Returns the status the write must still observe and the status it sets.
    async fn validate_transition(
        id: &str,
        event: JobTransition,
        db: &SurrealDbClient,
    ) -> Result<(JobStatus, JobStatus), AppError> {
        let current = db
            .get_item::<GenerationJob>(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("generation job {id}")))?;
        let next = compute_next_state(&current.status, event)?;
        Ok((current.status, next))
    }

    /// Leases a pending job. The status guard makes the claim atomic: a job
    /// that changed status after validation is rejected instead of being
    /// leased twice.
    pub async fn mark_processing(id: &str, db: &SurrealDbClient) -> Result<GenerationJob, AppError> {
        let (current, next) = Self::validate_transition(id, JobTransition::Lease, db).await?;

        const LEASE_QUERY: &str = r#"
            UPDATE type::thing($table, $id)
            SET status = $next,
                attempts = attempts + 1,
                updated_at = $now
            WHERE status = $current
            RETURN AFTER;
        "#;

        let now = Utc::now();
        let mut result = db
            .client
            .query(LEASE_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("id", id.to_string()))
            .bind(("next", next.as_str()))
            .bind(("current", current.as_str()))
            .bind(("now", SurrealDatetime::from(now)))
            .await?;

        let updated: Option<GenerationJob> = result.take(0)?;
        updated.ok_or_else(|| invalid_transition(&current, JobTransition::Lease))
    }

    pub async fn mark_completed(
        id: &str,
        job_result: serde_json::Value,
        db: &SurrealDbClient,
    ) -> Result<GenerationJob, AppError> {
        let (current, next) = Self::validate_transition(id, JobTransition::Complete, db).await?;

        const COMPLETE_QUERY: &str = r#"
            UPDATE type::thing($table, $id)
            SET status = $next,
                result = $result,
                error_message = NONE,
                processed_at = $now,
                updated_at = $now
            WHERE status = $current
            RETURN AFTER;
        "#;

        let now = Utc::now();
        let mut result = db
            .client
            .query(COMPLETE_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("id", id.to_string()))
            .bind(("next", next.as_str()))
            .bind(("current", current.as_str()))
            .bind(("result", job_result))
            .bind(("now", SurrealDatetime::from(now)))
            .await?;

        let updated: Option<GenerationJob> = result.take(0)?;
        updated.ok_or_else(|| invalid_transition(&current, JobTransition::Complete))
    }

    pub async fn mark_failed(
        id: &str,
        message: &str,
        db: &SurrealDbClient,
    ) -> Result<GenerationJob, AppError> {
        let (current, next) = Self::validate_transition(id, JobTransition::Fail, db).await?;

        const FAIL_QUERY: &str = r#"
            UPDATE type::thing($table, $id)
            SET status = $next,
                error_message = $error_message,
                processed_at = $now,
                updated_at = $now
            WHERE status = $current
            RETURN AFTER;
        "#;

        let now = Utc::now();
        let mut result = db
            .client
            .query(FAIL_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("id", id.to_string()))
            .bind(("next", next.as_str()))
            .bind(("current", current.as_str()))
            .bind(("error_message", message.to_string()))
            .bind(("now", SurrealDatetime::from(now)))
            .await?;

        let updated: Option<GenerationJob> = result.take(0)?;
        updated.ok_or_else(|| invalid_transition(&current, JobTransition::Fail))
    }

    pub async fn reset_to_pending(id: &str, db: &SurrealDbClient) -> Result<GenerationJob, AppError> {
        let (current, next) = Self::validate_transition(id, JobTransition::Requeue, db).await?;

        const REQUEUE_QUERY: &str = r#"
            UPDATE type::thing($table, $id)
            SET status = $next,
                updated_at = $now
            WHERE status = $current
            RETURN AFTER;
        "#;

        let now = Utc::now();
        let mut result = db
            .client
            .query(REQUEUE_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("id", id.to_string()))
            .bind(("next", next.as_str()))
            .bind(("current", current.as_str()))
            .bind(("now", SurrealDatetime::from(now)))
            .await?;

        let updated: Option<GenerationJob> = result.take(0)?;
        updated.ok_or_else(|| invalid_transition(&current, JobTransition::Requeue))
    }

    /// Returns jobs left in `processing` by a previous run to `pending`.
    /// Only safe while no worker is running against the same store.
    pub async fn requeue_interrupted(db: &SurrealDbClient) -> Result<Vec<GenerationJob>, AppError> {
        let next = compute_next_state(&JobStatus::Processing, JobTransition::Requeue)?;

        let jobs: Vec<GenerationJob> = db
            .query(
                "UPDATE type::table($table)
                 SET status = $next, updated_at = $now
                 WHERE status = $processing
                 RETURN AFTER",
            )
            .bind(("table", Self::table_name()))
            .bind(("next", next.as_str()))
            .bind(("processing", JobStatus::Processing.as_str()))
            .bind(("now", SurrealDatetime::from(Utc::now())))
            .await?
            .take(0)?;

        Ok(jobs)
    }

    pub async fn get_unfinished_jobs(db: &SurrealDbClient) -> Result<Vec<GenerationJob>, AppError> {
        let jobs: Vec<GenerationJob> = db
            .query(
                "SELECT * FROM type::table($table)
                 WHERE status IN $active_states
                 ORDER BY created_at ASC",
            )
            .bind(("table", Self::table_name()))
            .bind((
                "active_states",
                vec![
                    JobStatus::Pending.as_str(),
                    JobStatus::Processing.as_str(),
                ],
            ))
            .await?
            .take(0)?;

        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create_payload() -> JobPayload {
        JobPayload::Generate {
            prompt: "Napiši obavijest o zatvaranju ceste".to_string(),
            system: None,
            document_text: None,
        }
    }

    async fn memory_db() -> SurrealDbClient {
        let namespace = "test_ns";
        let database = Uuid::new_v4().to_string();
        SurrealDbClient::memory(namespace, &database)
            .await
            .expect("in-memory surrealdb")
    }

    #[test]
    fn test_transition_table() {
        assert_eq!(
            compute_next_state(&JobStatus::Pending, JobTransition::Lease).expect("lease"),
            JobStatus::Processing
        );
        assert_eq!(
            compute_next_state(&JobStatus::Processing, JobTransition::Requeue).expect("requeue"),
            JobStatus::Pending
        );
        assert!(compute_next_state(&JobStatus::Completed, JobTransition::Lease).is_err());
        assert!(compute_next_state(&JobStatus::Failed, JobTransition::Lease).is_err());
        assert!(compute_next_state(&JobStatus::Pending, JobTransition::Complete).is_err());
    }

    #[test]
    fn test_new_job_defaults() {
        let job = GenerationJob::new(&create_payload(), 0);

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.request_type, "generate");
        assert_eq!(job.attempts, 0);
        assert_eq!(job.max_attempts, 1, "max attempts is always positive");
        assert!(job.result.is_none());
        assert!(job.error_message.is_none());
        assert!(job.processed_at.is_none());
    }

    #[tokio::test]
    async fn test_lease_increments_attempts_once() {
        let db = memory_db().await;
        let created = GenerationJob::create_and_add_to_db(&create_payload(), 3, &db)
            .await
            .expect("store");

        let pending = GenerationJob::find_pending(&db)
            .await
            .expect("find")
            .expect("pending job");
        assert_eq!(pending.id, created.id);

        let leased = GenerationJob::mark_processing(&created.id, &db)
            .await
            .expect("lease");
        assert_eq!(leased.status, JobStatus::Processing);
        assert_eq!(leased.attempts, 1);

        let second_lease = GenerationJob::mark_processing(&created.id, &db).await;
        assert!(second_lease.is_err(), "a processing job cannot be leased");

        assert!(GenerationJob::find_pending(&db)
            .await
            .expect("find")
            .is_none());
    }

    #[tokio::test]
    async fn test_complete_records_result() {
        let db = memory_db().await;
        let created = GenerationJob::create_and_add_to_db(&create_payload(), 3, &db)
            .await
            .expect("store");
        GenerationJob::mark_processing(&created.id, &db)
            .await
            .expect("lease");

        let completed = GenerationJob::mark_completed(
            &created.id,
            json!({ "response": "Gotovo", "durationMs": 1000 }),
            &db,
        )
        .await
        .expect("complete");

        assert_eq!(completed.status, JobStatus::Completed);
        assert_eq!(
            completed.result.as_ref().and_then(|r| r.get("response")),
            Some(&json!("Gotovo"))
        );
        assert!(completed.processed_at.is_some());

        let relapse = GenerationJob::mark_processing(&created.id, &db).await;
        assert!(relapse.is_err(), "completed jobs are never leased again");
    }

    #[tokio::test]
    async fn test_requeue_then_fail() {
        let db = memory_db().await;
        let created = GenerationJob::create_and_add_to_db(&create_payload(), 2, &db)
            .await
            .expect("store");

        GenerationJob::mark_processing(&created.id, &db)
            .await
            .expect("first lease");
        let requeued = GenerationJob::reset_to_pending(&created.id, &db)
            .await
            .expect("requeue");
        assert_eq!(requeued.status, JobStatus::Pending);
        assert_eq!(requeued.attempts, 1);

        let leased = GenerationJob::mark_processing(&created.id, &db)
            .await
            .expect("second lease");
        assert_eq!(leased.attempts, 2);
        assert!(leased.attempts_exhausted());

        let failed = GenerationJob::mark_failed(
            &created.id,
            "NETWORK_ERROR: connection refused (after 2 attempts)",
            &db,
        )
        .await
        .expect("fail");
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(
            failed.error_message.as_deref(),
            Some("NETWORK_ERROR: connection refused (after 2 attempts)")
        );
        assert!(failed.status.is_terminal());

        let unfinished = GenerationJob::get_unfinished_jobs(&db).await.expect("list");
        assert!(unfinished.is_empty());
    }

    #[tokio::test]
    async fn test_find_pending_prefers_oldest() {
        let db = memory_db().await;

        let mut older = GenerationJob::new(&create_payload(), 3);
        older.created_at = Utc::now() - chrono::Duration::minutes(5);
        let newer = GenerationJob::new(&create_payload(), 3);

        db.store_item(newer.clone()).await.expect("store newer");
        db.store_item(older.clone()).await.expect("store older");

        let next = GenerationJob::find_pending(&db)
            .await
            .expect("find")
            .expect("pending job");
        assert_eq!(next.id, older.id);
    }

    #[tokio::test]
    async fn test_requeue_interrupted_only_touches_processing_jobs() {
        let db = memory_db().await;
        let interrupted = GenerationJob::create_and_add_to_db(&create_payload(), 3, &db)
            .await
            .expect("store");
        let waiting = GenerationJob::create_and_add_to_db(&create_payload(), 3, &db)
            .await
            .expect("store");
        GenerationJob::mark_processing(&interrupted.id, &db)
            .await
            .expect("lease");

        let requeued = GenerationJob::requeue_interrupted(&db).await.expect("requeue");
        assert_eq!(requeued.len(), 1);
        assert_eq!(requeued[0].id, interrupted.id);
        assert_eq!(requeued[0].attempts, 1, "attempts are preserved");

        let unfinished = GenerationJob::get_unfinished_jobs(&db).await.expect("list");
        assert_eq!(unfinished.len(), 2);
        assert!(unfinished
            .iter()
            .all(|job| job.status == JobStatus::Pending));
        assert!(unfinished.iter().any(|job| job.id == waiting.id));
    }

    #[tokio::test]
    async fn test_transitions_on_missing_job_are_rejected() {
        let db = memory_db().await;

        assert!(matches!(
            GenerationJob::mark_processing("missing", &db).await,
            Err(AppError::NotFound(_))
        ));
        assert!(GenerationJob::mark_completed("missing", json!({}), &db)
            .await
            .is_err());
        assert!(GenerationJob::reset_to_pending("missing", &db).await.is_err());
    }

    #[tokio::test]
    async fn test_lifecycle_rejects_transition_from_stored_status() {
        let db = memory_db().await;
        let created = GenerationJob::create_and_add_to_db(&create_payload(), 3, &db)
            .await
            .expect("store");

        let err = GenerationJob::mark_completed(&created.id, json!({ "response": "x" }), &db)
            .await
            .expect_err("a pending job cannot complete");
        match err {
            AppError::Validation(message) => {
                assert_eq!(message, "Invalid job transition: pending -> complete");
            }
            other => panic!("expected validation error, got {other:?}"),
        }

        let err = GenerationJob::reset_to_pending(&created.id, &db)
            .await
            .expect_err("a pending job cannot be requeued");
        assert!(matches!(err, AppError::Validation(_)));

        let stored = db
            .get_item::<GenerationJob>(&created.id)
            .await
            .expect("fetch")
            .expect("job exists");
        assert_eq!(stored.status, JobStatus::Pending);
        assert!(stored.result.is_none());
    }

    #[tokio::test]
    async fn test_failed_job_cannot_fail_again() {
        let db = memory_db().await;
        let created = GenerationJob::create_and_add_to_db(&create_payload(), 1, &db)
            .await
            .expect("store");
        GenerationJob::mark_processing(&created.id, &db)
            .await
            .expect("lease");
        GenerationJob::mark_failed(&created.id, "AUTH_ERROR: denied (after 1 attempts)", &db)
            .await
            .expect("fail");

        let err = GenerationJob::mark_failed(&created.id, "second", &db)
            .await
            .expect_err("failed is terminal");
        match err {
            AppError::Validation(message) => {
                assert_eq!(message, "Invalid job transition: failed -> fail");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_enqueue_uses_configured_max_attempts() {
        let db = memory_db().await;
        let mut config: AppConfig = serde_json::from_value(json!({
            "surrealdb_address": "mem://",
            "surrealdb_username": "root",
            "surrealdb_password": "root",
            "surrealdb_namespace": "test_ns",
            "surrealdb_database": "test_db"
        }))
        .expect("config");
        assert_eq!(config.job_max_attempts, DEFAULT_MAX_ATTEMPTS);

        config.job_max_attempts = 5;
        let job = GenerationJob::enqueue(&create_payload(), &config, &db)
            .await
            .expect("enqueue");
        assert_eq!(job.max_attempts, 5);

        let stored = GenerationJob::find_pending(&db)
            .await
            .expect("find")
            .expect("pending job");
        assert_eq!(stored.id, job.id);
        assert_eq!(stored.max_attempts, 5);
    }
}
