//! Stampede.
//!
//! Stampede is a standalone service answering key lookups over a line-based TCP protocol. Values
//! are expensive to compute and cached in memory, and concurrent lookups of a missing key share
//! a single computation instead of stampeding the backend.

#![warn(
    missing_docs,
    missing_debug_implementations,
    unused_crate_dependencies,
    clippy::all
)]

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

mod cli;
mod server;

fn main() {
    match cli::execute() {
        Ok(()) => std::process::exit(0),
        Err(error) => {
            stampede_service::logging::ensure_log_error(&error);
            std::process::exit(1);
        }
    }
}
