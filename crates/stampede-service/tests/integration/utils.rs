use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use stampede_service::backend::SimulatedBackend;
use stampede_service::caching::Cacher;
use stampede_service::client::LineClient;
use stampede_service::config::Config;
use stampede_service::listener;
use stampede_test::{self as test, Server};

/// The simulated backend latency used in tests, long enough for concurrent clients to overlap.
pub const LATENCY: Duration = Duration::from_millis(500);

/// A listener on an ephemeral port, backed by a [`SimulatedBackend`].
pub struct TestService {
    pub server: Server,
    pub backend: Arc<SimulatedBackend>,
    pub cacher: Cacher,
}

impl TestService {
    pub fn addr(&self) -> SocketAddr {
        self.server.addr()
    }

    pub async fn connect(&self) -> LineClient {
        LineClient::connect(self.addr()).await.unwrap()
    }
}

/// Setup tests and start a listener.
///
/// The backend latency defaults to [`LATENCY`]. The `update_config` closure can modify any
/// configuration before the listener is started.
pub async fn setup_service(update_config: impl FnOnce(&mut Config)) -> TestService {
    test::setup();

    let mut config = Config::default();
    config.backend.latency = LATENCY;
    update_config(&mut config);

    let backend = Arc::new(SimulatedBackend::from_config(&config.backend));
    let cacher = Cacher::new(config.cache, backend.clone());

    let server = Server::new({
        let cacher = cacher.clone();
        let server_config = config.server;
        move |socket| listener::serve(socket, cacher, server_config, std::future::pending())
    })
    .await;

    TestService {
        server,
        backend,
        cacher,
    }
}

/// Requests `key` from `clients` separate connections at the same time.
pub async fn concurrent_requests(addr: SocketAddr, key: &str, clients: usize) -> Vec<String> {
    let requests = (0..clients).map(|_| async move {
        let mut client = LineClient::connect(addr).await.unwrap();
        client.request(key).await.unwrap()
    });
    join_all(requests).await
}
