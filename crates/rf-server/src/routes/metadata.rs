//! Source metadata lookup.

use std::time::Duration;

use axum::extract::{Query, State};
use axum::{Extension, Json};

use rf_av::SourceMetadata;

use crate::context::AppContext;
use crate::error::AppError;
use crate::middleware::request_id::RequestId;
use crate::routes::stream::StreamQuery;

/// GET /api/metadata
#[utoipa::path(
    get,
    path = "/api/metadata",
    params(StreamQuery),
    responses(
        (status = 200, description = "Source duration", body = SourceMetadata),
        (status = 400, description = "Missing or invalid url"),
        (status = 500, description = "Probe failed"),
    )
)]
pub async fn metadata(
    State(ctx): State<AppContext>,
    Extension(request_id): Extension<RequestId>,
    Query(query): Query<StreamQuery>,
) -> Result<Json<SourceMetadata>, AppError> {
    let with_id = |e: rf_core::Error| AppError::from(e).with_request_id(request_id.0.clone());

    let url = query.source_url().map_err(with_id)?;
    let ffprobe = ctx.tools.path_or_name("ffprobe");
    let timeout = Duration::from_secs(ctx.config.probe.timeout_secs);

    let meta = rf_av::probe_duration(&ffprobe, &url, timeout)
        .await
        .map_err(with_id)?;
    Ok(Json(meta))
}
