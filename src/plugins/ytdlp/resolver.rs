use async_trait::async_trait;
use crate::plugins::registry::{
    MediaResolver, ProgressSink, RawCollection, ResolveError, ResolverContext, RetrieveJob,
    RetrievedMedia,
};
use crate::plugins::ytdlp::progress::{self, OutputLine, FILE_TAG, TITLE_TAG};
use std::collections::VecDeque;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

const STDERR_TAIL: usize = 20;
const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

/// Drives the `yt-dlp` executable as a subprocess.
pub struct YtDlpResolver {
    ctx: ResolverContext,
}

impl YtDlpResolver {
    pub fn new(ctx: ResolverContext) -> Self {
        Self { ctx }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.ctx.binary);
        cmd.arg("--socket-timeout")
            .arg(self.ctx.socket_timeout_secs.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn spawn_error(&self, e: std::io::Error) -> ResolveError {
        if e.kind() == ErrorKind::NotFound {
            ResolveError::Unavailable(format!("{} not found", self.ctx.binary.display()))
        } else {
            ResolveError::Failed(format!("failed to start {}: {}", self.ctx.binary.display(), e))
        }
    }

    /// The staging dir goes through `-P` so it is never read as an output
    /// template. Audio jobs keep the native stream; the served name carries
    /// the requested container.
    fn retrieve_args(job: &RetrieveJob<'_>) -> Vec<String> {
        let mut args = vec![
            "--no-playlist".to_string(),
            "--newline".to_string(),
            "--progress".to_string(),
            "--no-warnings".to_string(),
            "-f".to_string(),
            job.policy.format_selector(),
            "-P".to_string(),
            job.staging_dir.to_string_lossy().to_string(),
            "-o".to_string(),
            OUTPUT_TEMPLATE.to_string(),
            "--progress-template".to_string(),
            progress::progress_template(),
            "--print".to_string(),
            format!("after_move:{} %(title)s", TITLE_TAG),
            "--print".to_string(),
            format!("after_move:{} %(filepath)s", FILE_TAG),
        ];
        if !job.policy.audio_only {
            args.push("--merge-output-format".to_string());
            args.push(job.policy.output_container.clone());
        }
        args.push(job.reference.clone());
        args
    }
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn enumerate(&self, reference: &str) -> Result<RawCollection, ResolveError> {
        let output = self
            .command()
            .args(["--flat-playlist", "-J", "--no-warnings", "--skip-download"])
            .arg(reference)
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ResolveError::Failed(last_error_line(stderr.lines())));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| ResolveError::Failed(format!("unexpected yt-dlp output: {}", e)))
    }

    async fn retrieve(
        &self,
        job: &RetrieveJob<'_>,
        sink: &dyn ProgressSink,
    ) -> Result<RetrievedMedia, ResolveError> {
        let mut child = self
            .command()
            .args(Self::retrieve_args(job))
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ResolveError::Failed("stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ResolveError::Failed("stderr not captured".to_string()))?;

        let job_id = job.job_id;
        let stderr_task = tokio::spawn(collect_tail(stderr, job_id));

        let mut lines = BufReader::new(stdout).lines();
        let mut file: Option<String> = None;
        let mut title: Option<String> = None;
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| ResolveError::Failed(format!("read yt-dlp output: {}", e)))?
        {
            match progress::parse_line(&line) {
                OutputLine::Progress(u) => sink.on_progress(u),
                OutputLine::File(p) => file = Some(p),
                OutputLine::Title(t) => title = Some(t),
                OutputLine::Other => tracing::trace!(%job_id, line = %line, "yt-dlp"),
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| ResolveError::Failed(format!("wait for yt-dlp: {}", e)))?;
        let tail = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(ResolveError::Failed(last_error_line(tail.iter().map(String::as_str))));
        }

        let path = PathBuf::from(
            file.ok_or_else(|| ResolveError::Failed("yt-dlp did not report an output file".to_string()))?,
        );
        if !path.starts_with(job.staging_dir) {
            return Err(ResolveError::Failed(format!(
                "yt-dlp wrote outside the staging area: {}",
                path.display()
            )));
        }

        let title = title
            .filter(|t| !t.is_empty() && t != "NA")
            .or_else(|| path.file_stem().map(|s| s.to_string_lossy().to_string()))
            .unwrap_or_default();

        Ok(RetrievedMedia { path, title })
    }
}

async fn collect_tail<R: AsyncRead + Unpin>(reader: R, job_id: crate::core::model::JobId) -> VecDeque<String> {
    let mut tail = VecDeque::with_capacity(STDERR_TAIL);
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(%job_id, line = %line, "yt-dlp stderr");
        if tail.len() == STDERR_TAIL {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail
}

fn last_error_line<'a>(lines: impl Iterator<Item = &'a str>) -> String {
    let lines: Vec<&str> = lines.filter(|l| !l.trim().is_empty()).collect();
    lines
        .iter()
        .rev()
        .find(|l| l.starts_with("ERROR:"))
        .or_else(|| lines.last())
        .map(|l| l.trim_start_matches("ERROR:").trim().to_string())
        .unwrap_or_else(|| "yt-dlp exited with an error".to_string())
}
