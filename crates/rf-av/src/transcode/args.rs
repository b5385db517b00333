//! ffmpeg argument synthesis for streaming renditions.
//!
//! [`build_args`] is a pure function of the request and the encoder settings.
//! The output always goes to `pipe:1` with an explicit format, and video
//! renditions use fragmented MP4 so playback can start before the source ends.

use rf_core::config::TranscodeConfig;
use rf_core::{AccelerationMode, Quality, StreamRequest};

/// Movflags for MP4 that needs no trailing index.
pub const FRAGMENTED_MP4_FLAGS: &str = "frag_keyframe+empty_moov";

/// Output target for every rendition.
pub const STDOUT_TARGET: &str = "pipe:1";

/// Encoder knobs that do not vary per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSettings {
    pub vaapi_device: String,
    pub video_preset: String,
    pub video_crf: u32,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self::from(&TranscodeConfig::default())
    }
}

impl From<&TranscodeConfig> for EncoderSettings {
    fn from(cfg: &TranscodeConfig) -> Self {
        Self {
            vaapi_device: cfg.vaapi_device.clone(),
            video_preset: cfg.video_preset.clone(),
            video_crf: cfg.video_crf,
        }
    }
}

/// Build the ordered ffmpeg argument list for a stream request.
pub fn build_args(request: &StreamRequest, settings: &EncoderSettings) -> Vec<String> {
    let mut args = ArgList::default();
    let hardware = request.acceleration == AccelerationMode::Vaapi && !request.quality.is_audio_only();

    args.push_all(["-loglevel", "error"]);

    if request.start_offset_secs != 0.0 {
        args.push("-ss");
        args.push(format_seconds(request.start_offset_secs));
    }

    if request.is_network_source() {
        args.push_all([
            "-reconnect",
            "1",
            "-reconnect_streamed",
            "1",
            "-reconnect_delay_max",
            "5",
        ]);
    }

    // Decoder setup is an input option and must precede -i.
    if hardware {
        args.push_all(["-hwaccel", "vaapi", "-hwaccel_device"]);
        args.push(settings.vaapi_device.as_str());
        args.push_all(["-hwaccel_output_format", "vaapi"]);
    }

    args.push("-i");
    args.push(request.source_url.as_str());

    if request.quality.is_audio_only() {
        args.push_all(["-vn", "-c:a", "libmp3lame", "-f", "mp3", STDOUT_TARGET]);
        return args.0;
    }

    if hardware {
        args.push_all(["-c:v", "h264_vaapi", "-c:a", "aac"]);
        args.push_all(["-movflags", FRAGMENTED_MP4_FLAGS]);
    } else {
        args.push_all(["-c:v", "libx264", "-c:a", "aac", "-preset"]);
        args.push(settings.video_preset.as_str());
        args.push("-crf");
        args.push(settings.video_crf.to_string());
        args.push_all(["-movflags", FRAGMENTED_MP4_FLAGS]);
    }

    if let Some(filter) = scale_filter(request.quality, request.acceleration) {
        args.push("-vf");
        args.push(filter);
    }

    args.push_all(["-f", "mp4", STDOUT_TARGET]);
    args.0
}

/// Height-fixed scale filter for a quality, keeping aspect ratio with an even
/// auto width. `None` for `original` and `audio`.
pub fn scale_filter(quality: Quality, acceleration: AccelerationMode) -> Option<String> {
    let height = quality.height()?;
    Some(match acceleration {
        AccelerationMode::Vaapi => format!("scale_vaapi=w=-2:h={height}"),
        AccelerationMode::Software => format!("scale=-2:{height}"),
    })
}

/// Render a command line for logs and dry runs, quoted so it can be pasted
/// into a POSIX shell.
pub fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program.to_string())
        .chain(args.iter().map(|a| shell_quote(a)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Characters that never need quoting besides ASCII alphanumerics.
const SHELL_SAFE: &str = "_@%+=:,./-";

/// Single-quote `arg` unless every character is shell-safe.
fn shell_quote(arg: &str) -> String {
    let safe = |c: char| c.is_ascii_alphanumeric() || SHELL_SAFE.contains(c);
    if !arg.is_empty() && arg.chars().all(safe) {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}

/// `30.0` renders as `30`, `12.5` as `12.5`.
fn format_seconds(secs: f64) -> String {
    secs.to_string()
}

#[derive(Default)]
struct ArgList(Vec<String>);

impl ArgList {
    fn push(&mut self, arg: impl Into<String>) {
        self.0.push(arg.into());
    }

    fn push_all<'a>(&mut self, args: impl IntoIterator<Item = &'a str>) {
        self.0.extend(args.into_iter().map(String::from));
    }
}
