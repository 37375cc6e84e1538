//! HTTP request handlers.

pub mod gateway;
pub mod health;

pub use gateway::*;
pub use health::*;
