//! Parsing of the tagged lines we ask yt-dlp to print.

use crate::core::model::{ProgressPhase, ProgressUpdate};

pub const PROGRESS_TAG: &str = "[pdl-progress]";
pub const FILE_TAG: &str = "[pdl-file]";
pub const TITLE_TAG: &str = "[pdl-title]";

pub fn progress_template() -> String {
    format!(
        "download:{} %(progress.status)s|%(progress._percent_str)s|%(progress._speed_str)s|%(progress._eta_str)s",
        PROGRESS_TAG
    )
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutputLine {
    Progress(ProgressUpdate),
    File(String),
    Title(String),
    Other,
}

pub fn parse_line(line: &str) -> OutputLine {
    let line = line.trim_end_matches(['\r', '\n']);
    if let Some(rest) = line.trim_start().strip_prefix(PROGRESS_TAG) {
        return parse_progress(rest).map(OutputLine::Progress).unwrap_or(OutputLine::Other);
    }
    if let Some(rest) = line.strip_prefix(FILE_TAG) {
        let path = rest.trim();
        if !path.is_empty() {
            return OutputLine::File(path.to_string());
        }
    }
    if let Some(rest) = line.strip_prefix(TITLE_TAG) {
        return OutputLine::Title(rest.trim().to_string());
    }
    OutputLine::Other
}

fn parse_progress(rest: &str) -> Option<ProgressUpdate> {
    let mut parts = rest.split('|').map(str::trim);
    let status = parts.next()?;
    let percent = parts.next().and_then(parse_percent);
    let speed = parts.next().and_then(not_available);
    let eta = parts.next().and_then(not_available);

    match status {
        "downloading" => Some(ProgressUpdate {
            phase: ProgressPhase::Downloading,
            percent,
            speed,
            eta,
        }),
        "finished" => Some(ProgressUpdate {
            phase: ProgressPhase::Finished,
            percent: Some(100.0),
            speed: None,
            eta: None,
        }),
        _ => None,
    }
}

fn parse_percent(s: &str) -> Option<f64> {
    s.trim_end_matches('%').trim().parse::<f64>().ok()
}

fn not_available(s: &str) -> Option<String> {
    match s {
        "" | "NA" | "N/A" | "Unknown" => None,
        v => Some(v.to_string()),
    }
}
