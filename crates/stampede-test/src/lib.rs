//! Helpers for testing the listener and the cache.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - Hold on to a [`Server`] for as long as the test talks to it. Dropping it aborts the
//!    server task, and all further connections are refused.

use std::future::Future;
use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the `stampede` crates and mutes all
///    other logs.
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("stampede_service=trace,stampede_stress=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// A server listening on an ephemeral port of the loopback interface.
///
/// The server runs on a task of the current runtime, which is aborted when this is dropped.
#[derive(Debug)]
pub struct Server {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
}

impl Server {
    /// Binds to an ephemeral port and spawns the future created by `serve` on the bound listener.
    ///
    /// # Panics
    ///
    /// Panics if no port could be bound.
    pub async fn new<F, Fut>(serve: F) -> Self
    where
        F: FnOnce(TcpListener) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let socket = listener.local_addr().unwrap();
        let handle = tokio::spawn(serve(listener));

        Self { handle, socket }
    }

    /// Returns the socket address that this server listens on.
    pub fn addr(&self) -> SocketAddr {
        self.socket
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
