//! HTTP API handlers

pub mod health;
pub mod sse;
pub mod stats;
pub mod uploads;

pub use health::health_routes;
pub use sse::event_stream;
pub use stats::stats_routes;
pub use uploads::upload_routes;
