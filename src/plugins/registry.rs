use async_trait::async_trait;
use crate::core::model::{JobId, ProgressUpdate};
use crate::core::selector::SelectionPolicy;
use clap::{ArgMatches, Command};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
    /// The engine is not installed or cannot be started at all.
    #[error("media resolver unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Failed(String),
}

/// Flat enumeration output, mirroring the engine's JSON shape.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCollection {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub entries: Vec<Option<RawEntry>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub uploader: Option<String>,
}

#[derive(Debug)]
pub struct RetrieveJob<'a> {
    pub job_id: JobId,
    pub reference: String,
    pub policy: &'a SelectionPolicy,
    pub staging_dir: &'a Path,
}

/// A file the engine finished writing into the staging directory.
#[derive(Debug, Clone)]
pub struct RetrievedMedia {
    pub path: PathBuf,
    pub title: String,
}

/// Receives progress reports; implementations must not block or fail.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, update: ProgressUpdate);
}

#[async_trait]
pub trait MediaResolver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Metadata-only listing of a collection; no media bytes move.
    async fn enumerate(&self, reference: &str) -> Result<RawCollection, ResolveError>;

    /// Full resolution plus transfer into `job.staging_dir`.
    async fn retrieve(
        &self,
        job: &RetrieveJob<'_>,
        progress: &dyn ProgressSink,
    ) -> Result<RetrievedMedia, ResolveError>;
}

#[derive(Debug, Clone)]
pub struct ResolverContext {
    pub binary: PathBuf,
    pub socket_timeout_secs: u64,
    pub offline: bool,
}

impl Default for ResolverContext {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("yt-dlp"),
            socket_timeout_secs: 30,
            offline: false,
        }
    }
}

pub trait CliPlugin: Send + Sync {
    fn name(&self) -> &'static str;
    fn augment_command(&self, cmd: Command) -> Command;
    fn apply_matches(&self, matches: &ArgMatches, ctx: &mut ResolverContext) -> anyhow::Result<()>;
}

pub fn cli_plugin() -> Box<dyn CliPlugin> {
    Box::new(crate::plugins::ytdlp::cli::YtDlpCliPlugin::new())
}

pub fn build_resolver(ctx: &ResolverContext) -> Arc<dyn MediaResolver> {
    if ctx.offline {
        Arc::new(crate::plugins::offline::OfflineResolver::new())
    } else {
        Arc::new(crate::plugins::ytdlp::resolver::YtDlpResolver::new(ctx.clone()))
    }
}
