//! Source duration lookup via `ffprobe`.
//!
//! Runs `ffprobe -v error -show_entries format=duration -of json <url>` and
//! reads `format.duration`, which ffprobe prints as a decimal string.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::ToolCommand;

/// Metadata the player needs to map seek positions onto the source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SourceMetadata {
    /// Total duration of the source in seconds.
    pub duration_seconds: f64,
}

/// Probe the duration of `url` with the ffprobe at `ffprobe`.
///
/// # Errors
///
/// Returns [`rf_core::Error::Tool`] if ffprobe cannot run, exits non-zero,
/// or times out, and [`rf_core::Error::Probe`] if its output has no usable
/// duration.
pub async fn probe_duration(
    ffprobe: &Path,
    url: &str,
    timeout: Duration,
) -> rf_core::Result<SourceMetadata> {
    let output = ToolCommand::new(ffprobe.to_path_buf())
        .args(["-v", "error"])
        .args(["-show_entries", "format=duration"])
        .args(["-of", "json"])
        .arg(url)
        .timeout(timeout)
        .execute()
        .await?;

    let duration_seconds = parse_duration(&output.stdout)?;
    tracing::debug!(duration_seconds, "Probed source duration");
    Ok(SourceMetadata { duration_seconds })
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<DurationField>,
}

/// ffprobe writes numbers as strings in JSON, but be tolerant of either.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DurationField {
    Text(String),
    Number(f64),
}

fn parse_duration(json: &str) -> rf_core::Result<f64> {
    let parsed: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| rf_core::Error::Probe(format!("ffprobe JSON parse error: {e}")))?;

    let field = parsed
        .format
        .and_then(|f| f.duration)
        .ok_or_else(|| rf_core::Error::Probe("ffprobe reported no duration".into()))?;

    let seconds = match field {
        DurationField::Number(n) => n,
        DurationField::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| rf_core::Error::Probe(format!("unparsable duration {s:?}")))?,
    };

    if !seconds.is_finite() || seconds < 0.0 {
        return Err(rf_core::Error::Probe(format!("invalid duration {seconds}")));
    }
    Ok(seconds)
}
