mod core;
mod http;
mod plugins;
mod telemetry;

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use futures::stream::{FuturesUnordered, StreamExt};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::core::engine::{Engine, EngineConfig};
use crate::core::events::EngineEvent;
use crate::core::model::{JobId, JobStatus, RetrievalRequest, RetrievalStatus};
use crate::core::store::ArtifactStore;
use crate::http::router::ApiServer;
use crate::plugins::registry::{build_resolver, cli_plugin, ResolverContext};
use crate::telemetry::LogFormat;

fn build_cli() -> Command {
    let serve = Command::new("serve")
        .about("Run the HTTP API")
        .arg(
            Arg::new("bind")
                .long("bind")
                .help("Listen address")
                .env("PLAYLIST_DL_BIND")
                .default_value("0.0.0.0:5000")
                .num_args(1),
        );

    let list = Command::new("list")
        .about("Print the items of a playlist")
        .arg(Arg::new("url").help("Playlist URL").required(true).num_args(1));

    let download = Command::new("download")
        .about("Download one or more videos by id")
        .arg(
            Arg::new("video_ids")
                .help("Video ids to download")
                .action(ArgAction::Append)
                .num_args(1..)
                .required(true),
        )
        .arg(
            Arg::new("quality")
                .long("quality")
                .help("360p, 480p, 720p, 1080p or best")
                .default_value("720p")
                .num_args(1),
        )
        .arg(
            Arg::new("format")
                .long("format")
                .help("Output container, e.g. mp4 or mp3")
                .default_value("mp4")
                .num_args(1),
        );

    let cmd = Command::new("playlist-dl")
        .about("Playlist enumeration and single-item download service backed by yt-dlp")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("out_dir")
                .long("out-dir")
                .help("Download directory")
                .global(true)
                .default_value("./downloads")
                .num_args(1),
        )
        .arg(
            Arg::new("demo_count")
                .long("demo-count")
                .help("Items in the demo playlist served while yt-dlp is unavailable")
                .global(true)
                .default_value("10")
                .num_args(1),
        )
        .arg(
            Arg::new("max_jobs")
                .long("max-jobs")
                .help("Concurrent downloads allowed (0 = unlimited)")
                .global(true)
                .default_value("0")
                .num_args(1),
        )
        .arg(
            Arg::new("retention_secs")
                .long("retention-secs")
                .help("How long finished jobs stay queryable")
                .global(true)
                .default_value("3600")
                .num_args(1),
        )
        .arg(
            Arg::new("log_format")
                .long("log-format")
                .help("json, pretty or auto")
                .global(true)
                .default_value("auto")
                .num_args(1),
        )
        .subcommand(serve)
        .subcommand(list)
        .subcommand(download);

    cli_plugin().augment_command(cmd)
}

fn parse_arg<T>(m: &ArgMatches, id: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = m
        .get_one::<String>(id)
        .with_context(|| format!("missing value for --{}", id.replace('_', "-")))?;
    raw.parse::<T>()
        .with_context(|| format!("invalid value for --{}: {raw}", id.replace('_', "-")))
}

async fn build_engine(m: &ArgMatches) -> anyhow::Result<Engine> {
    let out_dir: PathBuf = parse_arg(m, "out_dir")?;
    let config = EngineConfig {
        demo_count: parse_arg(m, "demo_count")?,
        max_jobs: parse_arg(m, "max_jobs")?,
        retention: Duration::from_secs(parse_arg(m, "retention_secs")?),
    };

    let mut ctx = ResolverContext::default();
    let plugin = cli_plugin();
    plugin.apply_matches(m, &mut ctx)?;
    tracing::info!(
        plugin = plugin.name(),
        binary = %ctx.binary.display(),
        offline = ctx.offline,
        "resolver configured"
    );

    let store = ArtifactStore::open(&out_dir)
        .await
        .with_context(|| format!("cannot open download dir {}", out_dir.display()))?;
    Ok(Engine::new(build_resolver(&ctx), store, config))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = build_cli().get_matches();

    let format = matches
        .get_one::<String>("log_format")
        .map(|s| LogFormat::parse(s))
        .unwrap_or_else(LogFormat::infer);
    telemetry::init_logging(format, "info")?;

    match matches.subcommand() {
        Some(("serve", m)) => {
            let addr: SocketAddr = parse_arg(m, "bind")?;
            let engine = build_engine(m).await?;
            tracing::info!(root = %engine.store().root().display(), "serving downloads");
            ApiServer::new(engine).serve(addr).await?;
        }
        Some(("list", m)) => {
            let engine = build_engine(m).await?;
            let url = m.get_one::<String>("url").context("missing playlist url")?;
            let listing = engine.list_collection(url).await?;
            println!("{} ({} items)", listing.title, listing.items.len());
            for (i, item) in listing.items.iter().enumerate() {
                println!(
                    "{:>3}. {} [{}] {} - {}",
                    i + 1,
                    item.video_id,
                    item.duration,
                    item.title,
                    item.author
                );
            }
        }
        Some(("download", m)) => {
            let engine = build_engine(m).await?;
            let quality = parse_arg::<String>(m, "quality")?;
            let format = parse_arg::<String>(m, "format")?;
            let ids: Vec<String> = m
                .get_many::<String>("video_ids")
                .context("missing video ids")?
                .cloned()
                .collect();
            run_downloads(engine, ids, quality, format).await?;
        }
        _ => {}
    }

    Ok(())
}

async fn run_downloads(
    engine: Engine,
    ids: Vec<String>,
    quality: String,
    format: String,
) -> anyhow::Result<()> {
    // Subscribe before any job starts so no event is missed.
    let mut rx = engine.subscribe();

    let mut jobs: Vec<(JobId, String)> = Vec::with_capacity(ids.len());
    let mut pins = Vec::with_capacity(ids.len());
    for video_id in ids {
        let request = RetrievalRequest {
            video_id: video_id.clone(),
            quality: quality.clone(),
            format: format.clone(),
        };
        let (job_id, pin) = engine.start_pinned(request).await?;
        jobs.push((job_id, video_id));
        pins.push(pin);
    }

    let names: HashMap<JobId, String> = jobs.iter().cloned().collect();
    let mut ui_task = tokio::spawn(async move {
        let mp = MultiProgress::new();
        let sty_spin = ProgressStyle::with_template("{spinner:.green} {prefix} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("|/-\\ ");
        let sty_bar = ProgressStyle::with_template("{prefix} {bar:40.cyan/blue} {pos:>3}% {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());

        let mut bars: HashMap<JobId, ProgressBar> = HashMap::new();
        for (job_id, video_id) in &names {
            let pb = mp.add(ProgressBar::new_spinner());
            pb.set_style(sty_spin.clone());
            pb.set_prefix(format!("[{video_id}]"));
            pb.enable_steady_tick(Duration::from_millis(120));
            pb.set_message("queued");
            bars.insert(*job_id, pb);
        }

        let mut done: HashSet<JobId> = HashSet::new();
        while done.len() < names.len() {
            let evt = match rx.recv().await {
                Ok(e) => e,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => break,
            };
            match evt {
                EngineEvent::JobStatusChanged { job_id, status } => {
                    let Some(pb) = bars.get(&job_id) else { continue };
                    match status {
                        JobStatus::Finished => {
                            pb.finish_with_message("done");
                            done.insert(job_id);
                        }
                        JobStatus::Failed => {
                            pb.finish_with_message("failed");
                            done.insert(job_id);
                        }
                        other => pb.set_message(format!("{:?}", other).to_lowercase()),
                    }
                }
                EngineEvent::Progress { job_id, snapshot } => {
                    let Some(pb) = bars.get(&job_id) else { continue };
                    if pb.length() != Some(100) {
                        pb.set_style(sty_bar.clone());
                        pb.set_length(100);
                    }
                    pb.set_position(snapshot.percent.round().clamp(0.0, 100.0) as u64);
                    pb.set_message(format!("{} | eta {}", snapshot.speed, snapshot.eta));
                }
                EngineEvent::ArtifactReady { job_id, filename, path } => {
                    let who = names.get(&job_id).map(String::as_str).unwrap_or("?");
                    let _ = mp.println(format!("[READY] {} {} -> {}", who, filename, path.display()));
                }
                EngineEvent::Error { scope, message } => {
                    let _ = mp.println(format!("[ERR] {}: {}", scope, message));
                }
            }
        }
    });

    let mut pending: FuturesUnordered<_> = jobs
        .iter()
        .map(|(job_id, video_id)| {
            let engine = engine.clone();
            let job_id = *job_id;
            let video_id = video_id.clone();
            async move { (video_id, engine.wait_result(job_id).await) }
        })
        .collect();

    let mut results = Vec::with_capacity(jobs.len());
    while let Some(r) = pending.next().await {
        results.push(r);
    }
    drop(pins);
    // A lagged receiver can miss a terminal event; don't hang on the UI.
    if tokio::time::timeout(Duration::from_secs(2), &mut ui_task).await.is_err() {
        ui_task.abort();
    }

    println!();
    println!("Summary:");
    let mut failed = 0usize;
    for (video_id, result) in &results {
        match result.status {
            RetrievalStatus::Success => println!(
                "- {} ok {} -> {}",
                video_id,
                result.filename,
                engine.store().root().join(&result.filename).display()
            ),
            RetrievalStatus::Error => {
                failed += 1;
                println!("- {} error: {}", video_id, result.message);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} downloads failed", failed, results.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_globals_after_subcommand() {
        let m = build_cli()
            .try_get_matches_from([
                "playlist-dl",
                "download",
                "abc",
                "def",
                "--format",
                "mp3",
                "--max-jobs",
                "2",
                "--offline",
            ])
            .unwrap();
        let (name, sub) = m.subcommand().unwrap();
        assert_eq!(name, "download");
        assert_eq!(parse_arg::<usize>(sub, "max_jobs").unwrap(), 2);
        assert_eq!(parse_arg::<String>(sub, "format").unwrap(), "mp3");
        assert_eq!(sub.get_many::<String>("video_ids").unwrap().count(), 2);
    }

    #[test]
    fn bad_numeric_flag_is_reported() {
        let m = build_cli()
            .try_get_matches_from(["playlist-dl", "list", "u", "--demo-count", "many"])
            .unwrap();
        let (_, sub) = m.subcommand().unwrap();
        let err = parse_arg::<usize>(sub, "demo_count").unwrap_err();
        assert!(err.to_string().contains("--demo-count"));
    }

    #[tokio::test]
    async fn offline_engine_lists_demo_playlist() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("dl");
        let m = build_cli()
            .try_get_matches_from([
                "playlist-dl",
                "list",
                "https://youtube.com/playlist?list=PL1",
                "--offline",
                "--demo-count",
                "3",
                "--out-dir",
                out.to_str().unwrap(),
            ])
            .unwrap();
        let (_, sub) = m.subcommand().unwrap();
        let engine = build_engine(sub).await.unwrap();
        let listing = engine.list_collection("https://youtube.com/playlist?list=PL1").await.unwrap();
        assert_eq!(listing.items.len(), 3);
        assert!(listing.demo);
        assert!(out.is_dir());
    }
}
