//! Axum router construction.
//!
//! Builds the application router with the API routes, middleware layers,
//! OpenAPI docs, and optional static file serving for the player UI.

use std::path::Path;

use axum::middleware;
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::context::AppContext;
use crate::middleware::request_id::request_id_middleware;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::health::health_check,
        routes::stream::stream,
        routes::metadata::metadata,
        routes::tools::tools,
    ),
    components(schemas(
        routes::health::HealthResponse,
        rf_av::SourceMetadata,
        rf_av::ToolInfo,
    ))
)]
struct ApiDoc;

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext) -> Router {
    let api = Router::new()
        .route("/stream", get(routes::stream::stream))
        .route("/metadata", get(routes::metadata::metadata))
        .route("/tools", get(routes::tools::tools));

    let static_dir = ctx.config.server.static_dir.clone();
    let cors = ctx.config.server.cors;

    let mut app = Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/api", api)
        .merge(SwaggerUi::new("/api-docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(ctx);

    if cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }
    app = app.layer(TraceLayer::new_for_http());

    if let Some(dir) = static_dir {
        app = with_static_files(app, &dir);
    }

    app
}

/// Serve a single-page app from `dir`, falling back to `index.html`.
fn with_static_files(app: Router, dir: &Path) -> Router {
    if !dir.exists() {
        tracing::warn!("Static directory {} does not exist; not serving UI", dir.display());
        return app;
    }

    tracing::info!("Serving static files from {}", dir.display());
    let index_path = dir.join("index.html");
    app.fallback_service(
        tower_http::services::ServeDir::new(dir)
            .append_index_html_on_directories(true)
            .not_found_service(tower_http::services::ServeFile::new(index_path)),
    )
}
