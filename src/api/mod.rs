//! API Module
//!
//! HTTP handlers and routing for the demo gateway.
//!
//! # Endpoints
//! - `PUT /set` - Store a JSON value, optionally with a TTL
//! - `GET /get/:key` - Retrieve a value by key
//! - `DELETE /del/:key` - Delete a key
//! - `POST /incr/:key` - Increment a counter
//! - `GET /ttl/:key` - Remaining lifetime of a key
//! - `GET /health` - Connection health check

pub mod error;
pub mod handlers;
pub mod routes;

pub use error::ApiError;
pub use handlers::*;
pub use routes::create_router;
