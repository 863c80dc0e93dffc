#[macro_use]
pub mod metrics;

pub mod backend;
pub mod caching;
pub mod client;
pub mod config;
pub mod listener;
pub mod logging;
