//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries the
//! server, tool, transcode, and probe sections. Every section defaults
//! sensibly so a completely empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::media::AccelerationMode;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub tools: ToolsConfig,
    pub transcode: TranscodeConfig,
    pub probe: ProbeConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::BadRequest(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Strict variant of [`Config::load_or_default`] for `validate`: read and
    /// parse errors are returned instead of swallowed.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Apply `PORT` and `HW_ACCEL` from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply environment overrides using the given lookup.
    ///
    /// `HW_ACCEL=true` or `HW_ACCEL=1` selects VAAPI; any other value selects
    /// software encoding. An unparsable `PORT` is ignored.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("PORT") {
            match port.trim().parse::<u16>() {
                Ok(p) => self.server.port = p,
                Err(_) => tracing::warn!("Ignoring invalid PORT value {port:?}"),
            }
        }

        if let Some(flag) = lookup("HW_ACCEL") {
            self.transcode.hw_accel = match flag.trim() {
                "true" | "1" => AccelerationMode::Vaapi,
                _ => AccelerationMode::Software,
            };
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if let Some(ref dir) = self.server.static_dir {
            if !dir.exists() {
                warnings.push(format!(
                    "server.static_dir {} does not exist; static files disabled",
                    dir.display()
                ));
            }
        }

        if self.transcode.max_concurrent == Some(0) {
            warnings.push(
                "transcode.max_concurrent is 0; every stream request will be rejected".into(),
            );
        }

        if self.transcode.max_duration_secs == Some(0) {
            warnings.push(
                "transcode.max_duration_secs is 0; streams will be killed immediately".into(),
            );
        }

        if self.transcode.hw_accel == AccelerationMode::Vaapi
            && !Path::new(&self.transcode.vaapi_device).exists()
        {
            warnings.push(format!(
                "transcode.hw_accel is vaapi but device {} does not exist",
                self.transcode.vaapi_device
            ));
        }

        if self.transcode.video_crf > 51 {
            warnings.push(format!(
                "transcode.video_crf {} is outside the x264 range 0-51",
                self.transcode.video_crf
            ));
        }

        if self.probe.timeout_secs == 0 {
            warnings.push("probe.timeout_secs is 0; every probe will time out".into());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Optional built UI directory, served with SPA fallback.
    pub static_dir: Option<PathBuf>,
    /// Allow cross-origin requests from any origin.
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            static_dir: None,
            cors: true,
        }
    }
}

/// Paths to external CLI tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}

/// Transcode argument and lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    /// Encoding path for video renditions.
    pub hw_accel: AccelerationMode,
    /// DRM render node used for VAAPI.
    pub vaapi_device: String,
    /// x264 preset for the software path.
    pub video_preset: String,
    /// x264 constant rate factor for the software path.
    pub video_crf: u32,
    /// Maximum simultaneous transcodes; `None` means unlimited.
    pub max_concurrent: Option<usize>,
    /// Kill a transcode after this many seconds; `None` disables the limit.
    pub max_duration_secs: Option<u64>,
    /// Reject unrecognized `quality` values instead of treating them as
    /// `original`.
    pub strict_quality: bool,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            hw_accel: AccelerationMode::Software,
            vaapi_device: "/dev/dri/renderD128".into(),
            video_preset: "ultrafast".into(),
            video_crf: 23,
            max_concurrent: None,
            max_duration_secs: None,
            strict_quality: false,
        }
    }
}

/// Metadata probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub timeout_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.server.port, 3000);
        assert!(cfg.server.cors);
        assert_eq!(cfg.transcode.hw_accel, AccelerationMode::Software);
        assert_eq!(cfg.transcode.video_preset, "ultrafast");
        assert_eq!(cfg.transcode.video_crf, 23);
        assert_eq!(cfg.transcode.max_concurrent, None);
        assert_eq!(cfg.probe.timeout_secs, 30);
    }

    #[test]
    fn default_config_no_warnings() {
        let warnings = Config::default().validate();
        assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);
    }

    #[test]
    fn parse_json_config() {
        let json = r#"{"server": {"port": 9090}, "transcode": {"hw_accel": "vaapi", "max_concurrent": 2}}"#;
        let cfg = Config::from_json(json).unwrap();
        assert_eq!(cfg.server.port, 9090);
        assert_eq!(cfg.transcode.hw_accel, AccelerationMode::Vaapi);
        assert_eq!(cfg.transcode.max_concurrent, Some(2));
        assert_eq!(cfg.transcode.video_crf, 23);
    }

    #[test]
    fn parse_empty_json_uses_defaults() {
        let cfg = Config::from_json("{}").unwrap();
        assert_eq!(cfg.server.port, 3000);
    }

    #[test]
    fn parse_invalid_json_is_error() {
        assert!(Config::from_json("{not json").is_err());
    }

    #[test]
    fn load_or_default_with_missing_file() {
        let cfg = Config::load_or_default(Some(Path::new("/nonexistent/relayforge.json")));
        assert_eq!(cfg.server.port, 3000);
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relayforge.json");
        std::fs::write(&path, r#"{"transcode": {"video_preset": "veryfast"}}"#).unwrap();
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.transcode.video_preset, "veryfast");
        assert!(Config::load(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn hw_accel_env_override() {
        let mut cfg = Config::default();
        cfg.apply_env_with(env(&[("HW_ACCEL", "true")]));
        assert_eq!(cfg.transcode.hw_accel, AccelerationMode::Vaapi);

        cfg.apply_env_with(env(&[("HW_ACCEL", "0")]));
        assert_eq!(cfg.transcode.hw_accel, AccelerationMode::Software);

        cfg.apply_env_with(env(&[("HW_ACCEL", "1")]));
        assert_eq!(cfg.transcode.hw_accel, AccelerationMode::Vaapi);
    }

    #[test]
    fn port_env_override() {
        let mut cfg = Config::default();
        cfg.apply_env_with(env(&[("PORT", "8088")]));
        assert_eq!(cfg.server.port, 8088);

        cfg.apply_env_with(env(&[("PORT", "not-a-port")]));
        assert_eq!(cfg.server.port, 8088);
    }

    #[test]
    fn zero_limits_warn() {
        let mut cfg = Config::default();
        cfg.transcode.max_concurrent = Some(0);
        cfg.transcode.max_duration_secs = Some(0);
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.contains("max_concurrent")));
        assert!(warnings.iter().any(|w| w.contains("max_duration_secs")));
    }

    #[test]
    fn missing_vaapi_device_warns() {
        let mut cfg = Config::default();
        cfg.transcode.hw_accel = AccelerationMode::Vaapi;
        cfg.transcode.vaapi_device = "/nonexistent/renderD999".into();
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.contains("renderD999")));
    }
}
