//! API Routes
//!
//! Configures the Axum router with all gateway endpoints.

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    delete_handler, get_handler, health_handler, increment_handler, set_handler, ttl_handler,
    AppState,
};
use crate::connection::ConnectionFactory;
use crate::ops::ValueCommands;

/// Creates the main router with all endpoints configured.
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router<F>(state: AppState<F>) -> Router
where
    F: ConnectionFactory,
    F::Connection: ValueCommands,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/set", put(set_handler::<F>))
        .route("/get/:key", get(get_handler::<F>))
        .route("/del/:key", delete(delete_handler::<F>))
        .route("/incr/:key", post(increment_handler::<F>))
        .route("/ttl/:key", get(ttl_handler::<F>))
        .route("/health", get(health_handler::<F>))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
