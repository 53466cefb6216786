use crate::core::catalog::{demo_listing, summarize};
use crate::core::events::EngineEvent;
use crate::core::model::*;
use crate::core::reference::{collection_url, extract_collection_id, item_url};
use crate::core::selector::{build_policy, SelectionPolicy};
use crate::core::store::{sanitize_title, with_container, ArtifactStore};
use crate::core::tracker::{ProgressTracker, WaiterPin};
use crate::plugins::registry::{MediaResolver, ProgressSink, ResolveError, RetrieveJob, RetrievedMedia};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, Notify, Semaphore};
use url::Url;
use uuid::Uuid;

pub const DEMO_DOWNLOAD_URL: &str = "#";

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("{0}")]
    Input(String),

    #[error("Error fetching playlist: {0}")]
    Resolution(String),

    #[error("Error downloading video: {0}")]
    Transfer(String),
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub demo_count: usize,
    /// 0 means unlimited.
    pub max_jobs: usize,
    pub retention: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            demo_count: 10,
            max_jobs: 0,
            retention: Duration::from_secs(3600),
        }
    }
}

#[derive(Clone)]
pub struct Engine {
    resolver: Arc<dyn MediaResolver>,
    store: ArtifactStore,
    tracker: ProgressTracker,
    event_tx: broadcast::Sender<EngineEvent>,
    job_notifies: Arc<Mutex<HashMap<JobId, Arc<Notify>>>>,
    admission: Option<Arc<Semaphore>>,
    demo_count: usize,
}

impl Engine {
    pub fn new(resolver: Arc<dyn MediaResolver>, store: ArtifactStore, config: EngineConfig) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            resolver,
            store,
            tracker: ProgressTracker::new(config.retention),
            event_tx,
            job_notifies: Arc::new(Mutex::new(HashMap::new())),
            admission: (config.max_jobs > 0).then(|| Arc::new(Semaphore::new(config.max_jobs))),
            demo_count: config.demo_count,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn job(&self, job_id: JobId) -> Option<JobRecord> {
        self.tracker.get(job_id)
    }

    /// Flat listing of a playlist. Falls back to demo data while the
    /// resolver is unavailable.
    pub async fn list_collection(&self, raw_url: &str) -> Result<CollectionListing, EngineError> {
        let raw_url = raw_url.trim();
        if raw_url.is_empty() {
            return Err(EngineError::Input("Playlist URL is required".to_string()));
        }
        let list_id = extract_collection_id(raw_url)
            .ok_or_else(|| EngineError::Input("Invalid YouTube playlist URL".to_string()))?;

        match self.resolver.enumerate(&collection_url(&list_id)).await {
            Ok(raw) => {
                let listing = summarize(&raw);
                tracing::info!(
                    resolver = self.resolver.name(),
                    list_id = %list_id,
                    items = listing.items.len(),
                    "playlist enumerated"
                );
                Ok(listing)
            }
            Err(ResolveError::Unavailable(why)) => {
                tracing::warn!(reason = %why, "resolver unavailable, returning demo playlist");
                Ok(demo_listing(self.demo_count))
            }
            Err(ResolveError::Failed(msg)) => {
                tracing::error!(list_id = %list_id, error = %msg, "playlist enumeration failed");
                Err(EngineError::Resolution(msg))
            }
        }
    }

    /// Admits a job and runs it in the background.
    pub async fn start_retrieval(&self, request: RetrievalRequest) -> Result<JobId, EngineError> {
        self.start_pinned(request).await.map(|(job_id, _)| job_id)
    }

    /// Like `start_retrieval`, but the job record cannot be pruned before
    /// the returned pin is dropped.
    pub async fn start_pinned(&self, request: RetrievalRequest) -> Result<(JobId, WaiterPin), EngineError> {
        let video_id = request.video_id.trim().to_string();
        if video_id.is_empty() {
            return Err(EngineError::Input("Video ID is required".to_string()));
        }
        let policy = build_policy(&request.quality, &request.format);

        let job_id = Uuid::new_v4();
        let pin = self.tracker.admit(job_id, &video_id);
        let _ = self.event_tx.send(EngineEvent::JobStatusChanged { job_id, status: JobStatus::Pending });

        let notify = Arc::new(Notify::new());
        {
            let mut m = self.job_notifies.lock().await;
            m.insert(job_id, notify.clone());
        }

        let engine = self.clone();
        tokio::spawn(async move {
            engine.run_job(job_id, video_id, policy, notify).await;
        });

        Ok((job_id, pin))
    }

    /// Runs one job to its terminal result.
    pub async fn run_retrieval(&self, request: RetrievalRequest) -> Result<(JobId, RetrievalResult), EngineError> {
        let (job_id, _pin) = self.start_pinned(request).await?;
        Ok((job_id, self.wait_result(job_id).await))
    }

    pub async fn wait_result(&self, job_id: JobId) -> RetrievalResult {
        self.wait_job(job_id)
            .await
            .and_then(|r| r.result)
            .unwrap_or_else(|| RetrievalResult::error(format!("unknown job {}", job_id)))
    }

    pub async fn wait_job(&self, job_id: JobId) -> Option<JobRecord> {
        let _pin = self.tracker.pin(job_id)?;
        loop {
            let notify = {
                let m = self.job_notifies.lock().await;
                m.get(&job_id).cloned()
            };
            let Some(n) = notify else {
                return self.tracker.get(job_id);
            };

            let notified = n.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            match self.tracker.get(job_id) {
                Some(r) if r.status.is_terminal() => return Some(r),
                None => return None,
                Some(_) => notified.await,
            }
        }
    }

    async fn run_job(&self, job_id: JobId, video_id: String, policy: SelectionPolicy, notify: Arc<Notify>) {
        let _permit = match &self.admission {
            Some(sem) => sem.clone().acquire_owned().await.ok(),
            None => None,
        };

        self.set_status(job_id, JobStatus::Resolving);
        tracing::info!(
            %job_id,
            resolver = self.resolver.name(),
            video_id = %video_id,
            format = %policy.format_selector(),
            "job started"
        );

        let result = match self.execute(job_id, &video_id, &policy).await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(%job_id, error = %e, "job failed");
                let _ = self.event_tx.send(EngineEvent::Error {
                    scope: format!("job({})", job_id),
                    message: e.to_string(),
                });
                RetrievalResult::error(e.to_string())
            }
        };

        self.store.discard_staging(job_id).await;

        let status = if result.is_success() { JobStatus::Finished } else { JobStatus::Failed };
        if self.tracker.complete(job_id, result) {
            let _ = self.event_tx.send(EngineEvent::JobStatusChanged { job_id, status });
        }

        {
            let mut m = self.job_notifies.lock().await;
            m.remove(&job_id);
        }
        notify.notify_waiters();
    }

    async fn execute(
        &self,
        job_id: JobId,
        video_id: &str,
        policy: &SelectionPolicy,
    ) -> Result<RetrievalResult, EngineError> {
        let staging = self
            .store
            .create_staging(job_id)
            .await
            .map_err(|e| EngineError::Transfer(format!("{:#}", e)))?;

        let sink = TrackerSink {
            job_id,
            tracker: self.tracker.clone(),
            event_tx: self.event_tx.clone(),
            started: AtomicBool::new(false),
        };
        let job = RetrieveJob {
            job_id,
            reference: item_url(video_id),
            policy,
            staging_dir: &staging,
        };

        let media = match self.resolver.retrieve(&job, &sink).await {
            Ok(m) => m,
            Err(ResolveError::Unavailable(why)) => {
                tracing::warn!(%job_id, reason = %why, "resolver unavailable, returning demo result");
                return Ok(demo_result(video_id));
            }
            Err(ResolveError::Failed(msg)) => return Err(EngineError::Transfer(msg)),
        };

        let filename = artifact_name(&media, policy);
        let path = self
            .store
            .promote(&media.path, &filename)
            .await
            .map_err(|e| EngineError::Transfer(format!("{:#}", e)))?;

        tracing::info!(%job_id, file = %path.display(), "artifact ready");
        let _ = self.event_tx.send(EngineEvent::ArtifactReady {
            job_id,
            filename: filename.clone(),
            path,
        });

        Ok(RetrievalResult {
            status: RetrievalStatus::Success,
            download_url: Some(serve_url(&filename)),
            filename,
            message: "Video ready for download".to_string(),
        })
    }

    fn set_status(&self, job_id: JobId, status: JobStatus) {
        if self.tracker.set_status(job_id, status) {
            let _ = self.event_tx.send(EngineEvent::JobStatusChanged { job_id, status });
        }
    }
}

/// Feeds resolver callbacks into the tracker and the event bus.
struct TrackerSink {
    job_id: JobId,
    tracker: ProgressTracker,
    event_tx: broadcast::Sender<EngineEvent>,
    started: AtomicBool,
}

impl ProgressSink for TrackerSink {
    fn on_progress(&self, update: ProgressUpdate) {
        let Some(snapshot) = self.tracker.record(self.job_id, &update) else {
            return;
        };
        if !self.started.swap(true, Ordering::SeqCst) {
            let _ = self.event_tx.send(EngineEvent::JobStatusChanged {
                job_id: self.job_id,
                status: JobStatus::Downloading,
            });
        }
        let _ = self.event_tx.send(EngineEvent::Progress { job_id: self.job_id, snapshot });
    }
}

/// Final on-disk name: sanitized title plus the container that will be
/// served. Audio jobs always carry the requested audio container.
pub fn artifact_name(media: &RetrievedMedia, policy: &SelectionPolicy) -> String {
    let native_ext = media
        .path
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| policy.output_container.clone());
    let title = if media.title.trim().is_empty() {
        media
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    } else {
        media.title.clone()
    };

    let name = format!("{}.{}", sanitize_title(&title), native_ext);
    if policy.audio_only {
        with_container(&name, &policy.output_container)
    } else {
        name
    }
}

/// `/serve_file/<name>` with the name percent-encoded as one path segment.
pub fn serve_url(filename: &str) -> String {
    Url::parse("http://localhost/serve_file")
        .ok()
        .and_then(|mut u| {
            u.path_segments_mut().ok()?.push(filename);
            Some(u.path().to_string())
        })
        .unwrap_or_else(|| format!("/serve_file/{}", filename))
}

fn demo_result(video_id: &str) -> RetrievalResult {
    RetrievalResult {
        status: RetrievalStatus::Success,
        filename: format!("demo_video_{}.mp4", video_id),
        message: "Demo mode: Install yt-dlp for actual downloads".to_string(),
        download_url: Some(DEMO_DOWNLOAD_URL.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::fake::{entry, FakeResolver, Script};
    use crate::plugins::registry::RawCollection;
    use std::path::PathBuf;

    async fn engine_with(resolver: FakeResolver) -> (Engine, Arc<FakeResolver>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path().join("downloads")).await.unwrap();
        let resolver = Arc::new(resolver);
        let engine = Engine::new(resolver.clone(), store, EngineConfig::default());
        (engine, resolver, dir)
    }

    async fn engine_with_retention(resolver: FakeResolver, retention: Duration) -> (Engine, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path().join("downloads")).await.unwrap();
        let config = EngineConfig { retention, ..EngineConfig::default() };
        (Engine::new(Arc::new(resolver), store, config), dir)
    }

    async fn until_terminal(engine: &Engine, job_id: JobId) {
        for _ in 0..400 {
            if engine.job(job_id).is_some_and(|r| r.status.is_terminal()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {job_id} never finished");
    }

    fn request(id: &str, quality: &str, format: &str) -> RetrievalRequest {
        RetrievalRequest {
            video_id: id.to_string(),
            quality: quality.to_string(),
            format: format.to_string(),
        }
    }

    #[tokio::test]
    async fn listing_maps_entries() {
        let raw = RawCollection {
            title: Some("Road Trip".to_string()),
            uploader: Some("DJ".to_string()),
            entries: vec![entry("v1", Some(""), Some(125.0), None), entry("v2", Some("Two"), None, Some("Guest"))],
        };
        let (engine, _, _dir) = engine_with(FakeResolver::succeed("x", "mp4", b"").with_collection(raw)).await;

        let listing = engine
            .list_collection("https://www.youtube.com/watch?v=v1&list=PL42")
            .await
            .unwrap();
        assert!(!listing.demo);
        assert_eq!(listing.title, "Road Trip");
        assert_eq!(listing.items[0].title, "https://www.youtube.com/watch?v=v1");
        assert_eq!(listing.items[0].duration, "2:05");
        assert_eq!(listing.items[0].author, "DJ");
        assert_eq!(listing.items[1].author, "Guest");
    }

    #[tokio::test]
    async fn listing_input_errors() {
        let (engine, _, _dir) = engine_with(FakeResolver::succeed("x", "mp4", b"")).await;
        assert!(matches!(engine.list_collection("  ").await, Err(EngineError::Input(m)) if m == "Playlist URL is required"));
        assert!(matches!(
            engine.list_collection("https://example.com/?list=PL1").await,
            Err(EngineError::Input(m)) if m == "Invalid YouTube playlist URL"
        ));
    }

    #[tokio::test]
    async fn listing_failure_is_resolution_error() {
        let (engine, _, _dir) =
            engine_with(FakeResolver::succeed("x", "mp4", b"").with_enumerate_error("HTTP Error 404")).await;
        let err = engine
            .list_collection("https://www.youtube.com/playlist?list=PL1")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Resolution(_)));
        assert_eq!(err.to_string(), "Error fetching playlist: HTTP Error 404");
    }

    #[tokio::test]
    async fn unavailable_resolver_yields_stable_demo_listing() {
        let (engine, _, _dir) = engine_with(FakeResolver::new(Script::Unavailable)).await;
        let url = "https://www.youtube.com/playlist?list=PL1";
        let a = engine.list_collection(url).await.unwrap();
        let b = engine.list_collection(url).await.unwrap();
        assert!(a.demo);
        assert_eq!(a.items.len(), 10);
        assert_eq!(a.items, b.items);
        assert!(a.title.contains("Demo"));
    }

    #[tokio::test]
    async fn successful_job_promotes_artifact() {
        let (engine, fake, _dir) = engine_with(FakeResolver::succeed("My Clip", "mp4", b"VIDEO")).await;
        let mut events = engine.subscribe();

        let (_, result) = engine.run_retrieval(request("abc", "720p", "mp4")).await.unwrap();
        assert!(result.is_success(), "{result:?}");
        assert_eq!(result.filename, "My Clip.mp4");
        assert_eq!(result.download_url.as_deref(), Some("/serve_file/My%20Clip.mp4"));
        assert!(engine.store().exists("My Clip.mp4").await);
        assert_eq!(fake.calls(), 1);

        let mut statuses = vec![];
        let mut percents = vec![];
        while let Ok(evt) = events.try_recv() {
            match evt {
                EngineEvent::JobStatusChanged { status, .. } => statuses.push(status),
                EngineEvent::Progress { snapshot, .. } => percents.push(snapshot.percent),
                _ => {}
            }
        }
        assert_eq!(
            statuses,
            [JobStatus::Pending, JobStatus::Resolving, JobStatus::Downloading, JobStatus::Finished]
        );
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(percents.last().copied(), Some(100.0));
    }

    #[tokio::test]
    async fn audio_job_rewrites_container_and_sanitizes_title() {
        let (engine, _, _dir) = engine_with(FakeResolver::succeed("Live: Part 1?", "webm", b"OPUS")).await;
        let (_, result) = engine.run_retrieval(request("abc", "1080p", "mp3")).await.unwrap();
        assert!(result.is_success(), "{result:?}");
        assert_eq!(result.filename, "Live Part 1.mp3");
        assert!(engine.store().exists("Live Part 1.mp3").await);
        assert!(!engine.store().exists("Live Part 1.webm").await);
    }

    #[tokio::test]
    async fn failed_transfer_registers_nothing() {
        let (engine, _, _dir) = engine_with(FakeResolver::new(Script::FailAfter {
            steps: vec![10.0, 40.0],
            message: "network unreachable".to_string(),
        }))
        .await;

        let job_id = engine.start_retrieval(request("abc", "720p", "mp4")).await.unwrap();
        let record = engine.wait_job(job_id).await.unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        let result = record.result.unwrap();
        assert_eq!(result.status, RetrievalStatus::Error);
        assert_eq!(result.message, "Error downloading video: network unreachable");
        assert!(result.download_url.is_none());

        assert!(!engine.store().exists("partial.mp4.part").await);
        assert!(tokio::fs::metadata(engine.store().staging_dir(job_id)).await.is_err());
        let mut entries = tokio::fs::read_dir(engine.store().root()).await.unwrap();
        while let Some(e) = entries.next_entry().await.unwrap() {
            assert!(e.file_type().await.unwrap().is_dir(), "unexpected file {:?}", e.path());
        }
    }

    #[tokio::test]
    async fn empty_video_id_is_input_error() {
        let (engine, fake, _dir) = engine_with(FakeResolver::succeed("x", "mp4", b"")).await;
        assert!(matches!(
            engine.start_retrieval(request("  ", "720p", "mp4")).await,
            Err(EngineError::Input(_))
        ));
        let err = engine.run_retrieval(request("", "720p", "mp4")).await.unwrap_err();
        assert_eq!(err.to_string(), "Video ID is required");
        assert_eq!(fake.calls(), 0);
    }

    #[tokio::test]
    async fn unavailable_resolver_finishes_with_demo_placeholder() {
        let (engine, _, _dir) = engine_with(FakeResolver::new(Script::Unavailable)).await;
        let job_id = engine.start_retrieval(request("xyz", "720p", "mp4")).await.unwrap();
        let record = engine.wait_job(job_id).await.unwrap();
        assert_eq!(record.status, JobStatus::Finished);
        let result = record.result.unwrap();
        assert_eq!(result.filename, "demo_video_xyz.mp4");
        assert_eq!(result.download_url.as_deref(), Some("#"));
        assert!(!engine.store().exists("demo_video_xyz.mp4").await);
    }

    #[tokio::test]
    async fn progress_is_observable_while_in_flight() {
        let hold = Arc::new(Notify::new());
        let (engine, _, _dir) =
            engine_with(FakeResolver::succeed("Held", "mp4", b"x").with_hold(hold.clone())).await;

        let job_id = engine.start_retrieval(request("abc", "best", "mp4")).await.unwrap();
        let mut snapshot = None;
        for _ in 0..200 {
            if let Some(r) = engine.job(job_id) {
                if r.status == JobStatus::Downloading {
                    snapshot = r.progress;
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let snapshot = snapshot.expect("job never reached downloading");
        assert_eq!(snapshot.phase, ProgressPhase::Downloading);
        assert!(snapshot.percent >= 10.0 && snapshot.percent <= 100.0);
        assert!(!engine.store().exists("Held.mp4").await);

        hold.notify_one();
        let result = engine.wait_result(job_id).await;
        assert!(result.is_success());
        assert_eq!(engine.job(job_id).unwrap().progress.unwrap().phase, ProgressPhase::Finished);
    }

    #[tokio::test]
    async fn concurrent_jobs_are_tracked_separately() {
        let (engine, fake, _dir) = engine_with(FakeResolver::succeed("Same", "mp4", b"x")).await;
        let ids = futures::future::join_all(
            (0..4).map(|i| engine.start_retrieval(request(&format!("id{i}"), "480p", "mp4"))),
        )
        .await;
        let ids: Vec<JobId> = ids.into_iter().map(Result::unwrap).collect();
        for id in &ids {
            let r = engine.wait_job(*id).await.unwrap();
            assert_eq!(r.status, JobStatus::Finished);
        }
        assert_eq!(fake.calls(), 4);
        assert_eq!(ids.iter().collect::<std::collections::HashSet<_>>().len(), 4);
    }

    #[tokio::test]
    async fn zero_retention_keeps_result_for_pinned_waiter() {
        let (engine, _dir) = engine_with_retention(FakeResolver::succeed("Kept", "mp4", b"k"), Duration::ZERO).await;

        let (first, pin) = engine.start_pinned(request("a", "720p", "mp4")).await.unwrap();
        until_terminal(&engine, first).await;
        tokio::time::sleep(Duration::from_millis(2)).await;

        // admitting prunes expired records, but not pinned ones
        let second = engine.start_retrieval(request("b", "720p", "mp4")).await.unwrap();
        let result = engine.wait_result(first).await;
        assert!(result.is_success(), "{result:?}");
        assert_eq!(result.filename, "Kept.mp4");

        drop(pin);
        until_terminal(&engine, second).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        engine.start_retrieval(request("c", "720p", "mp4")).await.unwrap();
        assert!(engine.job(first).is_none());
    }

    #[tokio::test]
    async fn zero_retention_blocking_downloads_all_report_results() {
        let (engine, _dir) = engine_with_retention(FakeResolver::succeed("Many", "mp4", b"m"), Duration::ZERO).await;
        let results = futures::future::join_all(
            (0..6).map(|i| engine.run_retrieval(request(&format!("id{i}"), "720p", "mp4"))),
        )
        .await;
        for r in results {
            let (_, result) = r.unwrap();
            assert!(result.is_success(), "{result:?}");
        }
    }

    #[test]
    fn artifact_names() {
        let video = build_policy("720p", "mp4");
        let audio = build_policy("720p", "mp3");
        let media = |p: &str, t: &str| RetrievedMedia { path: PathBuf::from(p), title: t.to_string() };

        assert_eq!(artifact_name(&media("/s/a.webm", "A/B"), &video), "AB.webm");
        assert_eq!(artifact_name(&media("/s/a.m4a", "Song"), &audio), "Song.mp3");
        assert_eq!(artifact_name(&media("/s/Fallback.mp4", ""), &video), "Fallback.mp4");
        assert_eq!(artifact_name(&media("/s/noext", "T"), &video), "T.mp4");
    }

    #[test]
    fn serve_urls_are_encoded() {
        assert_eq!(serve_url("a.mp4"), "/serve_file/a.mp4");
        assert_eq!(serve_url("a b.mp4"), "/serve_file/a%20b.mp4");
        assert_eq!(serve_url("50%.mp4"), "/serve_file/50%25.mp4");
    }
}
