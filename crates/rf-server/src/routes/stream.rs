//! Live transcode endpoint.
//!
//! `GET /api/stream?url=<base64>&quality=<q>&start=<secs>` validates the
//! request, starts one engine, and relays its stdout as a chunked body. Status
//! and headers are sent once the engine has produced its first bytes; an engine
//! that dies before that gets a 500 instead of an empty 200.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Extension;
use serde::Deserialize;

use rf_core::config::TranscodeConfig;
use rf_core::{parse_start_offset, Quality, StreamRequest};

use crate::context::AppContext;
use crate::error::AppError;
use crate::middleware::request_id::RequestId;

/// Query parameters shared by `/api/stream` and `/api/metadata`.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StreamQuery {
    /// Source URL, base64 encoded. Must decode to an `http(s)` URL.
    pub url: Option<String>,
    /// `1080p`, `720p`, `480p`, `360p`, `original` (default) or `audio`.
    pub quality: Option<String>,
    /// Seek offset in seconds.
    pub start: Option<String>,
}

impl StreamQuery {
    /// Decode and validate the `url` parameter.
    pub fn source_url(&self) -> rf_core::Result<String> {
        let encoded = self
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| rf_core::Error::bad_request("Missing url parameter"))?;
        rf_core::decode_source_url(encoded)
    }

    /// Turn the query into a [`StreamRequest`] under the given settings.
    pub fn to_request(&self, transcode: &TranscodeConfig) -> rf_core::Result<StreamRequest> {
        let source_url = self.source_url()?;

        let quality = if transcode.strict_quality {
            match self.quality.as_deref() {
                Some(q) => q.parse::<Quality>().map_err(rf_core::Error::bad_request)?,
                None => Quality::default(),
            }
        } else {
            Quality::parse_lenient(self.quality.as_deref())
        };

        let start = parse_start_offset(self.start.as_deref())?;

        Ok(StreamRequest::new(source_url, quality, transcode.hw_accel).with_start(start))
    }
}

/// GET /api/stream
#[utoipa::path(
    get,
    path = "/api/stream",
    params(StreamQuery),
    responses(
        (status = 200, description = "Unbounded transcoded stream (video/mp4 or audio/mpeg)"),
        (status = 400, description = "Missing or invalid parameters"),
        (status = 500, description = "Engine failed before producing output"),
        (status = 503, description = "All transcode slots are in use"),
    )
)]
pub async fn stream(
    State(ctx): State<AppContext>,
    Extension(request_id): Extension<RequestId>,
    Query(query): Query<StreamQuery>,
) -> Result<Response, AppError> {
    let with_id = |e: rf_core::Error| AppError::from(e).with_request_id(request_id.0.clone());

    let request = query.to_request(&ctx.config.transcode).map_err(with_id)?;
    let args = rf_av::build_args(&request, &ctx.encoder);

    tracing::info!(
        quality = %request.quality,
        start = request.start_offset_secs,
        acceleration = %request.acceleration,
        "Starting transcode"
    );

    let output = ctx.transcoder.start(args).await.map_err(with_id)?;
    tracing::debug!(job = %output.job_id(), pid = ?output.pid(), "Streaming transcode output");

    let envelope = request.envelope();
    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, envelope.content_type),
            (CACHE_CONTROL, envelope.cache_control),
        ],
        Body::from_stream(output),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rf_core::{encode_source_url, AccelerationMode};

    fn query(url: Option<&str>, quality: Option<&str>, start: Option<&str>) -> StreamQuery {
        StreamQuery {
            url: url.map(String::from),
            quality: quality.map(String::from),
            start: start.map(String::from),
        }
    }

    #[test]
    fn missing_url_is_bad_request() {
        let err = query(None, None, None)
            .to_request(&TranscodeConfig::default())
            .unwrap_err();
        assert_eq!(err.http_status(), 400);
        assert!(err.to_string().contains("Missing url parameter"));

        let err = query(Some("  "), None, None)
            .to_request(&TranscodeConfig::default())
            .unwrap_err();
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn builds_request_from_query() {
        let url = encode_source_url("https://cdn.example.com/a.mkv");
        let request = query(Some(&url), Some("720p"), Some("30"))
            .to_request(&TranscodeConfig::default())
            .unwrap();
        assert_eq!(request.source_url, "https://cdn.example.com/a.mkv");
        assert_eq!(request.quality, Quality::P720);
        assert_eq!(request.start_offset_secs, 30.0);
        assert_eq!(request.acceleration, AccelerationMode::Software);
    }

    #[test]
    fn unknown_quality_falls_back_unless_strict() {
        let url = encode_source_url("http://host/v.mp4");
        let lenient = query(Some(&url), Some("4k"), None)
            .to_request(&TranscodeConfig::default())
            .unwrap();
        assert_eq!(lenient.quality, Quality::Original);

        let strict = TranscodeConfig {
            strict_quality: true,
            ..TranscodeConfig::default()
        };
        let err = query(Some(&url), Some("4k"), None)
            .to_request(&strict)
            .unwrap_err();
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn acceleration_comes_from_config() {
        let url = encode_source_url("http://host/v.mp4");
        let cfg = TranscodeConfig {
            hw_accel: AccelerationMode::Vaapi,
            ..TranscodeConfig::default()
        };
        let request = query(Some(&url), None, None).to_request(&cfg).unwrap();
        assert_eq!(request.acceleration, AccelerationMode::Vaapi);
    }

    #[test]
    fn bad_start_is_bad_request() {
        let url = encode_source_url("http://host/v.mp4");
        for start in ["-5", "abc", "inf"] {
            let err = query(Some(&url), None, Some(start))
                .to_request(&TranscodeConfig::default())
                .unwrap_err();
            assert_eq!(err.http_status(), 400, "start={start}");
        }
    }
}
