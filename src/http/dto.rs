//! Request and response bodies for the JSON routes.

use serde::{Deserialize, Serialize};

use crate::core::model::{
    ItemSummary, JobId, JobRecord, JobStatus, ProgressSnapshot, RetrievalResult, RetrievalStatus,
};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    Success,
    Error,
}

impl From<RetrievalStatus> for ReplyStatus {
    fn from(s: RetrievalStatus) -> Self {
        match s {
            RetrievalStatus::Success => Self::Success,
            RetrievalStatus::Error => Self::Error,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FetchPlaylistRequest {
    #[serde(default)]
    pub playlist_url: String,
    #[serde(default = "default_mode")]
    pub mode: String,
}

fn default_mode() -> String {
    "full".to_string()
}

#[derive(Debug, Serialize)]
pub struct FetchPlaylistResponse {
    pub status: ReplyStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playlist_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub videos: Option<Vec<ItemSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FetchPlaylistResponse {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Error,
            playlist_title: None,
            videos: None,
            total: None,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DownloadVideoRequest {
    #[serde(default)]
    pub video_id: String,
    #[serde(default = "default_quality")]
    pub quality: String,
    #[serde(default = "default_format")]
    pub format: String,
    /// When false the job id is returned immediately for polling.
    #[serde(default = "default_wait")]
    pub wait: bool,
}

fn default_quality() -> String {
    "720p".to_string()
}

fn default_format() -> String {
    "mp4".to_string()
}

fn default_wait() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct DownloadVideoResponse {
    pub status: ReplyStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
}

impl DownloadVideoResponse {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Error,
            message: message.into(),
            filename: None,
            download_url: None,
            job_id: None,
        }
    }

    pub fn from_result(job_id: JobId, result: RetrievalResult) -> Self {
        Self {
            status: result.status.into(),
            message: result.message,
            filename: Some(result.filename).filter(|f| !f.is_empty()),
            download_url: result.download_url,
            job_id: Some(job_id),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub status: ReplyStatus,
    pub job_id: JobId,
    pub video_id: String,
    pub state: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<RetrievalResult>,
}

impl From<JobRecord> for ProgressResponse {
    fn from(r: JobRecord) -> Self {
        Self {
            status: ReplyStatus::Success,
            job_id: r.id,
            video_id: r.video_id,
            state: r.status,
            progress: r.progress,
            result: r.result,
        }
    }
}
