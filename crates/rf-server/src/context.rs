//! Shared application context.
//!
//! [`AppContext`] is handed to every route handler via Axum state. Everything
//! in it is immutable after startup apart from the shutdown token; per-request
//! state lives in the [`rf_av::TranscodeStream`] each stream request owns.

use std::sync::Arc;

use rf_av::{EncoderSettings, ToolRegistry, Transcoder};
use rf_core::config::Config;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub tools: Arc<ToolRegistry>,
    pub transcoder: Arc<Transcoder>,
    /// Encoder knobs derived from `config.transcode`.
    pub encoder: Arc<EncoderSettings>,
    /// Cancelled on shutdown; ends every open stream.
    pub shutdown: CancellationToken,
}

impl AppContext {
    /// Build a context from configuration and already-discovered tools.
    pub fn new(config: Config, tools: ToolRegistry) -> Self {
        let transcoder = Transcoder::from_config(&tools, &config.transcode);
        Self::with_transcoder(config, tools, transcoder)
    }

    /// Build a context around an explicit [`Transcoder`].
    pub fn with_transcoder(config: Config, tools: ToolRegistry, transcoder: Transcoder) -> Self {
        let encoder = EncoderSettings::from(&config.transcode);
        let shutdown = transcoder.shutdown_token().clone();
        Self {
            config: Arc::new(config),
            tools: Arc::new(tools),
            transcoder: Arc::new(transcoder),
            encoder: Arc::new(encoder),
            shutdown,
        }
    }
}
