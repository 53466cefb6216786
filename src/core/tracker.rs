use crate::core::model::{
    JobId, JobRecord, JobStatus, ProgressPhase, ProgressSnapshot, ProgressUpdate, RetrievalResult,
    RetrievalStatus,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Arena of per-job records.
///
/// Every write replaces a whole `ProgressSnapshot` under the write lock, so a
/// reader sees either the previous snapshot or the next one, never a mix.
#[derive(Clone)]
pub struct ProgressTracker {
    jobs: Arc<RwLock<HashMap<JobId, JobRecord>>>,
    retention: Duration,
}

impl ProgressTracker {
    pub fn new(retention: Duration) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            retention,
        }
    }

    /// Inserts a pending record, pinned by the returned guard.
    pub fn admit(&self, id: JobId, video_id: &str) -> WaiterPin {
        let mut jobs = self.jobs.write();
        let retention = self.retention;
        jobs.retain(|_, r| {
            r.waiters > 0 || !(r.status.is_terminal() && r.touched.elapsed() > retention)
        });
        jobs.insert(
            id,
            JobRecord {
                id,
                video_id: video_id.to_string(),
                status: JobStatus::Pending,
                progress: None,
                result: None,
                touched: Instant::now(),
                waiters: 1,
            },
        );
        WaiterPin { tracker: self.clone(), id }
    }

    /// Returns false when the job is unknown or already terminal.
    pub fn set_status(&self, id: JobId, status: JobStatus) -> bool {
        let mut jobs = self.jobs.write();
        match jobs.get_mut(&id) {
            Some(r) if !r.status.is_terminal() => {
                r.status = status;
                r.touched = Instant::now();
                true
            }
            _ => false,
        }
    }

    /// Applies one callback report. Never fails; reports for unknown or
    /// terminal jobs are dropped.
    pub fn record(&self, id: JobId, update: &ProgressUpdate) -> Option<ProgressSnapshot> {
        let mut jobs = self.jobs.write();
        let r = jobs.get_mut(&id)?;
        if r.status.is_terminal() {
            return None;
        }

        let next = match update.phase {
            ProgressPhase::Finished => ProgressSnapshot::finished(),
            ProgressPhase::Downloading => {
                let prev = r.progress.as_ref().map(|p| p.percent).unwrap_or(0.0);
                let percent = update
                    .percent
                    .filter(|p| p.is_finite())
                    .map(|p| p.clamp(0.0, 100.0))
                    .unwrap_or(prev)
                    .max(prev);
                ProgressSnapshot {
                    percent,
                    speed: update.speed.clone().unwrap_or_else(|| "N/A".to_string()),
                    eta: update.eta.clone().unwrap_or_else(|| "N/A".to_string()),
                    phase: ProgressPhase::Downloading,
                }
            }
        };

        r.status = JobStatus::Downloading;
        r.progress = Some(next.clone());
        r.touched = Instant::now();
        Some(next)
    }

    /// Stores the terminal result. Only the first call per job wins.
    pub fn complete(&self, id: JobId, result: RetrievalResult) -> bool {
        let mut jobs = self.jobs.write();
        let Some(r) = jobs.get_mut(&id) else {
            return false;
        };
        if r.result.is_some() {
            return false;
        }

        r.status = match result.status {
            RetrievalStatus::Success => JobStatus::Finished,
            RetrievalStatus::Error => JobStatus::Failed,
        };
        if r.status == JobStatus::Finished {
            r.progress = Some(ProgressSnapshot::finished());
        }
        r.result = Some(result);
        r.touched = Instant::now();
        true
    }

    pub fn get(&self, id: JobId) -> Option<JobRecord> {
        self.jobs.read().get(&id).cloned()
    }

    /// Keeps the record alive until the returned guard is dropped.
    /// `None` when the job is unknown.
    pub fn pin(&self, id: JobId) -> Option<WaiterPin> {
        let mut jobs = self.jobs.write();
        let r = jobs.get_mut(&id)?;
        r.waiters += 1;
        Some(WaiterPin { tracker: self.clone(), id })
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }
}

pub struct WaiterPin {
    tracker: ProgressTracker,
    id: JobId,
}

impl Drop for WaiterPin {
    fn drop(&mut self) {
        if let Some(r) = self.tracker.jobs.write().get_mut(&self.id) {
            r.waiters = r.waiters.saturating_sub(1);
        }
    }
}
