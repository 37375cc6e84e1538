//! HTTP gateway for signed resource links.
//!
//! This crate provides:
//! - Token-addressed download and streaming endpoints
//! - The descriptor cache and routing policy behind them
//! - A byte-range-forwarding proxy to the upstream
//! - Health, stats and Prometheus endpoints

pub mod cache;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod policy;
pub mod proxy;
pub mod routes;
pub mod state;
pub mod trace;

pub use cache::{Clock, ManualClock, MetadataCache, SystemClock};
pub use error::ApiError;
pub use policy::{Routed, RoutingDecision, RoutingPolicy};
pub use proxy::StreamingProxy;
pub use routes::create_router;
pub use state::AppState;
pub use trace::TraceId;
