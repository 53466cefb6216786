use serde::Serialize;
use std::time::Instant;
use uuid::Uuid;

pub type JobId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Resolving,
    Downloading,
    Finished,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Failed)
    }
}

/// One playlist entry as presented to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemSummary {
    pub video_id: String,
    pub title: String,
    pub thumbnail: String,
    pub duration: String,
    pub author: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionListing {
    pub title: String,
    pub items: Vec<ItemSummary>,
    /// Synthetic listing produced while the resolver is unavailable.
    #[serde(skip)]
    pub demo: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    Downloading,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub percent: f64,
    pub speed: String,
    pub eta: String,
    pub phase: ProgressPhase,
}

impl ProgressSnapshot {
    pub fn finished() -> Self {
        Self {
            percent: 100.0,
            speed: "Complete".to_string(),
            eta: "0s".to_string(),
            phase: ProgressPhase::Finished,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetrievalResult {
    pub status: RetrievalStatus,
    pub filename: String,
    pub message: String,
    pub download_url: Option<String>,
}

impl RetrievalResult {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: RetrievalStatus::Error,
            filename: String::new(),
            message: message.into(),
            download_url: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RetrievalStatus::Success
    }
}

/// What the caller asked to download.
#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    pub video_id: String,
    pub quality: String,
    pub format: String,
}

#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: JobId,
    pub video_id: String,
    pub status: JobStatus,
    pub progress: Option<ProgressSnapshot>,
    pub result: Option<RetrievalResult>,
    pub(crate) touched: Instant,
    /// Callers blocked in `wait_job`; pins the record against pruning.
    pub(crate) waiters: usize,
}

/// Raw progress report as delivered by the retrieval engine callback.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub phase: ProgressPhase,
    pub percent: Option<f64>,
    pub speed: Option<String>,
    pub eta: Option<String>,
}
