//! Exchange job tracking.
//!
//! Jobs run inline; the job record is what an async caller receives and
//! polls. Stores hand out copies, never references into their state.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

#[cfg(feature = "typescript")]
use ts_rs::TS;

use backoffice_core::{AdminContext, AdminError, Result};

use crate::exchange::ExchangeSummary;

/// Default base path for job polling.
pub const DEFAULT_POLL_BASE: &str = "/admin/api/translations/jobs";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
pub enum JobKind {
    #[serde(rename = "export")]
    Export,
    #[serde(rename = "import.apply")]
    ImportApply,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Export => "export",
            Self::ImportApply => "import.apply",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
pub struct JobProgress {
    pub total: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl From<ExchangeSummary> for JobProgress {
    fn from(summary: ExchangeSummary) -> Self {
        Self {
            total: summary.processed,
            processed: summary.processed,
            succeeded: summary.succeeded,
            failed: summary.failed,
        }
    }
}

/// A tracked export or import job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeJob {
    pub id: String,
    pub kind: JobKind,
    /// Permission that created the job; also required to read it
    pub permission: String,
    pub created_by: String,
    pub status: JobStatus,
    pub progress: JobProgress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub poll_endpoint: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExchangeJob {
    pub fn new(ctx: &AdminContext, kind: JobKind, permission: &str, poll_base: &str) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        Self {
            poll_endpoint: format!("{}/{}", poll_base.trim_end_matches('/'), id),
            id,
            kind,
            permission: permission.to_string(),
            created_by: ctx.user_id().to_string(),
            status: JobStatus::Pending,
            progress: JobProgress::default(),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn start(&mut self, total: usize) {
        self.status = JobStatus::Running;
        self.progress.total = total;
        self.updated_at = Utc::now();
    }

    pub fn complete(&mut self, progress: JobProgress, result: Value) {
        self.status = JobStatus::Completed;
        self.progress = progress;
        self.result = Some(result);
        self.updated_at = Utc::now();
    }

    /// Mark failed. A partial result is kept when one exists.
    pub fn fail(&mut self, error: impl Into<String>, result: Option<Value>) {
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
        self.result = result;
        self.updated_at = Utc::now();
    }
}

/// Persistence for jobs.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: ExchangeJob) -> Result<()>;
    async fn update(&self, job: ExchangeJob) -> Result<()>;
    async fn get(&self, id: &str) -> Result<ExchangeJob>;
}

/// In-memory job store.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<String, ExchangeJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: ExchangeJob) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(AdminError::conflict(
                "duplicate_job",
                format!("job {} already exists", job.id),
                Default::default(),
            ));
        }
        jobs.insert(job.id.clone(), job);
        Ok(())
    }

    async fn update(&self, job: ExchangeJob) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&job.id) {
            Some(slot) => {
                *slot = job;
                Ok(())
            }
            None => Err(AdminError::not_found("job", job.id)),
        }
    }

    async fn get(&self, id: &str) -> Result<ExchangeJob> {
        self.jobs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| AdminError::not_found("job", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_job_lifecycle_in_store() {
        let store = MemoryJobStore::new();
        let ctx = AdminContext::new("translator");
        let mut job = ExchangeJob::new(
            &ctx,
            JobKind::ImportApply,
            "admin.translations.import.apply",
            DEFAULT_POLL_BASE,
        );
        assert_eq!(job.poll_endpoint, format!("{DEFAULT_POLL_BASE}/{}", job.id));
        assert_eq!(job.created_by, "translator");
        store.insert(job.clone()).await.unwrap();

        job.start(3);
        store.update(job.clone()).await.unwrap();
        assert_eq!(store.get(&job.id).await.unwrap().status, JobStatus::Running);

        job.complete(
            JobProgress { total: 3, processed: 3, succeeded: 3, failed: 0 },
            serde_json::json!({"ok": true}),
        );
        store.update(job.clone()).await.unwrap();
        let stored = store.get(&job.id).await.unwrap();
        assert!(stored.status.is_finished());
        assert_eq!(stored.progress.succeeded, 3);
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let store = MemoryJobStore::new();
        assert_eq!(store.get("nope").await.unwrap_err().status().as_u16(), 404);
    }

    #[test]
    fn test_kind_serializes_dotted() {
        assert_eq!(serde_json::to_value(JobKind::ImportApply).unwrap(), "import.apply");
        assert_eq!(JobKind::Export.as_str(), "export");
    }
}
