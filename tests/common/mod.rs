//! Common test utilities for bibrecord-dl integration tests

#[allow(dead_code)]
pub mod config;
#[allow(dead_code)]
pub mod fetcher;
#[allow(dead_code)]
pub mod fixtures;

#[allow(unused_imports)]
pub use config::*;
#[allow(unused_imports)]
pub use fetcher::*;
#[allow(unused_imports)]
pub use fixtures::*;
