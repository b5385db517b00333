//! Stream request domain types: target quality, acceleration mode, and the
//! response envelope derived from them.
//!
//! Enums serialize in lowercase and implement `Display` manually so the same
//! spelling is used in query strings, config files, and logs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Quality
// ---------------------------------------------------------------------------

/// Target rendition requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "360p")]
    P360,
    #[default]
    Original,
    Audio,
}

impl Quality {
    /// All qualities, in descending order of size.
    pub const ALL: [Quality; 6] = [
        Quality::P1080,
        Quality::P720,
        Quality::P480,
        Quality::P360,
        Quality::Original,
        Quality::Audio,
    ];

    /// Vertical resolution to scale to, if this quality names one.
    pub fn height(self) -> Option<u32> {
        match self {
            Self::P1080 => Some(1080),
            Self::P720 => Some(720),
            Self::P480 => Some(480),
            Self::P360 => Some(360),
            Self::Original | Self::Audio => None,
        }
    }

    /// Whether the output drops the video stream entirely.
    pub fn is_audio_only(self) -> bool {
        matches!(self, Self::Audio)
    }

    /// Lenient parse used for query strings: absent or unrecognized values
    /// fall back to [`Quality::Original`].
    pub fn parse_lenient(value: Option<&str>) -> Self {
        value.and_then(|v| v.parse().ok()).unwrap_or_default()
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::P1080 => write!(f, "1080p"),
            Self::P720 => write!(f, "720p"),
            Self::P480 => write!(f, "480p"),
            Self::P360 => write!(f, "360p"),
            Self::Original => write!(f, "original"),
            Self::Audio => write!(f, "audio"),
        }
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1080p" => Ok(Self::P1080),
            "720p" => Ok(Self::P720),
            "480p" => Ok(Self::P480),
            "360p" => Ok(Self::P360),
            "original" => Ok(Self::Original),
            "audio" => Ok(Self::Audio),
            _ => Err(format!("Unknown quality: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// AccelerationMode
// ---------------------------------------------------------------------------

/// Encoding path used for video renditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccelerationMode {
    #[default]
    Software,
    /// VAAPI decode, scale, and encode.
    #[serde(alias = "hardware-vaapi", alias = "hardware")]
    Vaapi,
}

impl fmt::Display for AccelerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Software => write!(f, "software"),
            Self::Vaapi => write!(f, "vaapi"),
        }
    }
}

impl FromStr for AccelerationMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "software" | "none" => Ok(Self::Software),
            "vaapi" | "hardware" | "hardware-vaapi" => Ok(Self::Vaapi),
            _ => Err(format!("Unknown acceleration mode: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// StreamRequest
// ---------------------------------------------------------------------------

/// A validated, request-scoped description of one transcode.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRequest {
    /// Decoded source URL; always begins with `http`.
    pub source_url: String,
    pub quality: Quality,
    /// Seek offset in seconds, finite and non-negative.
    pub start_offset_secs: f64,
    pub acceleration: AccelerationMode,
}

impl StreamRequest {
    /// Build a request with no seek offset.
    pub fn new(
        source_url: impl Into<String>,
        quality: Quality,
        acceleration: AccelerationMode,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            quality,
            start_offset_secs: 0.0,
            acceleration,
        }
    }

    /// Set the seek offset.
    pub fn with_start(mut self, secs: f64) -> Self {
        self.start_offset_secs = secs;
        self
    }

    /// Whether the source is fetched over the network.
    pub fn is_network_source(&self) -> bool {
        self.source_url.starts_with("http")
    }

    /// Response headers implied by this request.
    pub fn envelope(&self) -> ResponseEnvelope {
        ResponseEnvelope::for_quality(self.quality)
    }
}

/// Parse the `start` query parameter. Absent means zero.
pub fn parse_start_offset(value: Option<&str>) -> crate::Result<f64> {
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(0.0);
    };

    let secs: f64 = raw
        .parse()
        .map_err(|_| crate::Error::bad_request(format!("Invalid start offset: {raw}")))?;

    if !secs.is_finite() || secs < 0.0 {
        return Err(crate::Error::bad_request(format!(
            "Start offset must be a non-negative number: {raw}"
        )));
    }

    Ok(secs)
}

// ---------------------------------------------------------------------------
// ResponseEnvelope
// ---------------------------------------------------------------------------

/// Headers for an unbounded, chunked transcode response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseEnvelope {
    pub content_type: &'static str,
    pub cache_control: &'static str,
}

impl ResponseEnvelope {
    pub fn for_quality(quality: Quality) -> Self {
        let content_type = if quality.is_audio_only() {
            "audio/mpeg"
        } else {
            "video/mp4"
        };
        Self {
            content_type,
            cache_control: "no-cache",
        }
    }
}
