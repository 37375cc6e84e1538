//! Common test utilities and fixtures.

pub mod fixtures;
pub mod server;
pub mod upstream;

#[allow(unused_imports)]
pub use fixtures::*;
#[allow(unused_imports)]
pub use server::*;
#[allow(unused_imports)]
pub use upstream::*;
