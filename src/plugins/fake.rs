//! Scripted resolver for engine and HTTP tests.

use async_trait::async_trait;
use crate::core::model::{ProgressPhase, ProgressUpdate};
use crate::plugins::registry::{
    MediaResolver, ProgressSink, RawCollection, RawEntry, ResolveError, RetrieveJob,
    RetrievedMedia,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Clone)]
pub enum Script {
    /// Report each percent, then write `payload` as `<title>.<ext>`.
    Succeed { title: String, ext: String, payload: Vec<u8>, steps: Vec<f64> },
    /// Report each percent, leave a partial file behind, then fail.
    FailAfter { steps: Vec<f64>, message: String },
    Unavailable,
}

pub struct FakeResolver {
    pub collection: Option<RawCollection>,
    pub enumerate_error: Option<String>,
    pub script: Script,
    pub hold: Option<Arc<Notify>>,
    pub retrieve_calls: AtomicUsize,
}

impl FakeResolver {
    pub fn new(script: Script) -> Self {
        Self {
            collection: None,
            enumerate_error: None,
            script,
            hold: None,
            retrieve_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_collection(mut self, c: RawCollection) -> Self {
        self.collection = Some(c);
        self
    }

    pub fn with_enumerate_error(mut self, msg: &str) -> Self {
        self.enumerate_error = Some(msg.to_string());
        self
    }

    /// Blocks `retrieve` after the progress steps until notified.
    pub fn with_hold(mut self, hold: Arc<Notify>) -> Self {
        self.hold = Some(hold);
        self
    }

    pub fn succeed(title: &str, ext: &str, payload: &[u8]) -> Self {
        Self::new(Script::Succeed {
            title: title.to_string(),
            ext: ext.to_string(),
            payload: payload.to_vec(),
            steps: vec![10.0, 55.5, 100.0],
        })
    }

    pub fn calls(&self) -> usize {
        self.retrieve_calls.load(Ordering::SeqCst)
    }
}

pub fn entry(id: &str, title: Option<&str>, duration: Option<f64>, uploader: Option<&str>) -> Option<RawEntry> {
    Some(RawEntry {
        id: Some(id.to_string()),
        title: title.map(str::to_string),
        url: Some(format!("https://www.youtube.com/watch?v={}", id)),
        duration,
        uploader: uploader.map(str::to_string),
    })
}

fn report(sink: &dyn ProgressSink, steps: &[f64]) {
    for p in steps {
        sink.on_progress(ProgressUpdate {
            phase: ProgressPhase::Downloading,
            percent: Some(*p),
            speed: Some("2.00MiB/s".to_string()),
            eta: Some("00:01".to_string()),
        });
    }
}

#[async_trait]
impl MediaResolver for FakeResolver {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn enumerate(&self, _reference: &str) -> Result<RawCollection, ResolveError> {
        if matches!(self.script, Script::Unavailable) {
            return Err(ResolveError::Unavailable("fake unavailable".to_string()));
        }
        if let Some(msg) = &self.enumerate_error {
            return Err(ResolveError::Failed(msg.clone()));
        }
        Ok(self.collection.clone().unwrap_or_default())
    }

    async fn retrieve(
        &self,
        job: &RetrieveJob<'_>,
        sink: &dyn ProgressSink,
    ) -> Result<RetrievedMedia, ResolveError> {
        self.retrieve_calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Unavailable => Err(ResolveError::Unavailable("fake unavailable".to_string())),
            Script::FailAfter { steps, message } => {
                report(sink, steps);
                let partial = job.staging_dir.join("partial.mp4.part");
                tokio::fs::write(&partial, b"half")
                    .await
                    .map_err(|e| ResolveError::Failed(e.to_string()))?;
                if let Some(h) = &self.hold {
                    h.notified().await;
                }
                Err(ResolveError::Failed(message.clone()))
            }
            Script::Succeed { title, ext, payload, steps } => {
                report(sink, steps);
                if let Some(h) = &self.hold {
                    h.notified().await;
                }
                let path = job.staging_dir.join(format!("{}.{}", title, ext));
                tokio::fs::write(&path, payload)
                    .await
                    .map_err(|e| ResolveError::Failed(e.to_string()))?;
                sink.on_progress(ProgressUpdate {
                    phase: ProgressPhase::Finished,
                    percent: Some(100.0),
                    speed: None,
                    eta: None,
                });
                Ok(RetrievedMedia { path, title: title.clone() })
            }
        }
    }
}
