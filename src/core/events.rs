use crate::core::model::{JobId, JobStatus, ProgressSnapshot};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub enum EngineEvent {
    JobStatusChanged { job_id: JobId, status: JobStatus },
    Progress { job_id: JobId, snapshot: ProgressSnapshot },
    ArtifactReady { job_id: JobId, filename: String, path: PathBuf },
    Error { scope: String, message: String },
}
