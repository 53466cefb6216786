#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityTier {
    P360,
    P480,
    P720,
    P1080,
    Best,
}

impl QualityTier {
    /// Unknown labels fall back to `Best`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "360p" | "360" => Self::P360,
            "480p" | "480" => Self::P480,
            "720p" | "720" => Self::P720,
            "1080p" | "1080" => Self::P1080,
            _ => Self::Best,
        }
    }

    pub fn max_height(self) -> Option<u32> {
        match self {
            Self::P360 => Some(360),
            Self::P480 => Some(480),
            Self::P720 => Some(720),
            Self::P1080 => Some(1080),
            Self::Best => None,
        }
    }
}

const AUDIO_CONTAINERS: &[&str] = &["mp3", "m4a", "opus", "wav", "flac"];
const DEFAULT_VIDEO_CONTAINER: &str = "mp4";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionPolicy {
    pub quality: QualityTier,
    pub audio_only: bool,
    pub output_container: String,
}

impl SelectionPolicy {
    /// Format selector understood by the retrieval engine.
    ///
    /// Video requests use single-file selectors so no external muxer is
    /// needed when a combined stream already satisfies the bound.
    pub fn format_selector(&self) -> String {
        if self.audio_only {
            return "bestaudio/best".to_string();
        }
        match self.quality.max_height() {
            Some(h) => format!("best[height<={}]", h),
            None => "best".to_string(),
        }
    }
}

pub fn build_policy(quality: &str, format: &str) -> SelectionPolicy {
    let format = format.trim().to_ascii_lowercase();

    if AUDIO_CONTAINERS.contains(&format.as_str()) {
        return SelectionPolicy {
            quality: QualityTier::Best,
            audio_only: true,
            output_container: format,
        };
    }

    let output_container = if format.is_empty() {
        DEFAULT_VIDEO_CONTAINER.to_string()
    } else {
        format
    };

    SelectionPolicy {
        quality: QualityTier::parse(quality),
        audio_only: false,
        output_container,
    }
}
