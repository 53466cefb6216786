//! Mapping of raw enumeration output into presentable listings.

use crate::core::model::{CollectionListing, ItemSummary};
use crate::plugins::registry::{RawCollection, RawEntry};

const DEFAULT_COLLECTION_TITLE: &str = "YouTube Playlist";
const UNKNOWN_TITLE: &str = "Unknown Title";
const UNKNOWN_AUTHOR: &str = "Unknown";
const NOT_AVAILABLE: &str = "N/A";

pub const DEMO_COLLECTION_TITLE: &str = "Demo Playlist (Install yt-dlp for real data)";
const DEMO_THUMBNAIL: &str = "https://via.placeholder.com/320x180/000000/e50914?text=Demo+Video";

pub fn thumbnail_url(video_id: &str) -> String {
    format!("https://i.ytimg.com/vi/{}/mqdefault.jpg", video_id)
}

/// `m:ss`, or `N/A` for absent or non-positive durations.
pub fn format_duration(seconds: Option<f64>) -> String {
    let secs = match seconds {
        Some(s) if s.is_finite() && s > 0.0 => s as u64,
        _ => return NOT_AVAILABLE.to_string(),
    };
    format!("{}:{:02}", secs / 60, secs % 60)
}

fn non_empty(s: Option<&String>) -> Option<&str> {
    s.map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn summarize_entry(entry: &RawEntry, collection_author: Option<&str>) -> ItemSummary {
    let video_id = entry.id.clone().unwrap_or_default();

    let title = non_empty(entry.title.as_ref())
        .filter(|t| *t != "NA")
        .or_else(|| non_empty(entry.url.as_ref()))
        .unwrap_or(UNKNOWN_TITLE)
        .to_string();

    let author = non_empty(entry.uploader.as_ref())
        .or(collection_author)
        .unwrap_or(UNKNOWN_AUTHOR)
        .to_string();

    ItemSummary {
        thumbnail: thumbnail_url(&video_id),
        duration: format_duration(entry.duration),
        video_id,
        title,
        author,
    }
}

/// Keeps the engine's order and drops null entries.
pub fn summarize(raw: &RawCollection) -> CollectionListing {
    let collection_author = non_empty(raw.uploader.as_ref());
    let items = raw
        .entries
        .iter()
        .flatten()
        .map(|e| summarize_entry(e, collection_author))
        .collect();

    CollectionListing {
        title: non_empty(raw.title.as_ref())
            .unwrap_or(DEFAULT_COLLECTION_TITLE)
            .to_string(),
        items,
        demo: false,
    }
}

pub fn demo_listing(count: usize) -> CollectionListing {
    let items = (1..=count)
        .map(|i| ItemSummary {
            video_id: format!("demo_id_{}", i),
            title: format!("Demo Video {} - Sample Content", i),
            thumbnail: DEMO_THUMBNAIL.to_string(),
            duration: format!("{}:{:02}", i, (i * 13) % 60),
            author: "Demo Channel".to_string(),
        })
        .collect();

    CollectionListing {
        title: DEMO_COLLECTION_TITLE.to_string(),
        items,
        demo: true,
    }
}
