//! Intake API router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! Routes are nested under `/api/`.
//!
//! Layers (outermost → innermost):
//! 1. Request tracing → 2. `Extension<ApiContext>` → 3. Session resolution

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Build the intake API router.
///
/// Middleware uses `Extension<ApiContext>` (injected as the outermost layer).
/// Endpoint handlers use `State<ApiContext>` (provided via `with_state`).
pub fn intake_api_router(core: Arc<CoreState>) -> Router {
    let ctx = ApiContext::new(core);

    // Wizard routes: every request is bound to a session
    let wizard = Router::new()
        .route("/session", get(endpoints::session::current))
        .route("/session/resume", get(endpoints::session::resume))
        .route("/session/clear", post(endpoints::session::clear))
        .route("/steps", post(endpoints::steps::save))
        .route("/steps/draft", post(endpoints::steps::draft))
        .route(
            "/vaccinations",
            get(endpoints::vaccinations::current).post(endpoints::vaccinations::save),
        )
        .route("/report", post(endpoints::report::generate))
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::session::resolve_session))
        // Extension must be outermost so middleware can extract ApiContext
        .layer(axum::Extension(ctx.clone()));

    // Sessionless routes
    let open = Router::new()
        .route("/health", get(endpoints::health::check))
        .with_state(ctx);

    Router::new()
        .nest("/api", wizard.merge(open))
        .layer(TraceLayer::new_for_http())
}
