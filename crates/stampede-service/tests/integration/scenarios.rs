//! The demo runs of the stress tool, against a listener with a short backend latency.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::time::Instant;

use stampede_service::backend::derive_value;
use stampede_service::client::LineClient;

use crate::{LATENCY, concurrent_requests, setup_service};

#[tokio::test]
async fn test_cold_then_warm_stampede() {
    let service = setup_service(|_| ()).await;

    // cold cache
    let start = Instant::now();
    let responses = concurrent_requests(service.addr(), "stampede_key", 5).await;
    assert!(start.elapsed() >= LATENCY);
    assert!(responses.iter().all(|r| r == &derive_value("stampede_key")));
    assert_eq!(service.backend.computations(), 1);

    // warm cache
    let start = Instant::now();
    let responses = concurrent_requests(service.addr(), "stampede_key", 5).await;
    assert!(start.elapsed() < LATENCY);
    assert!(responses.iter().all(|r| r == &derive_value("stampede_key")));
    assert_eq!(service.backend.computations(), 1);

    // a different key
    let responses = concurrent_requests(service.addr(), "another_stampede_key", 8).await;
    assert_eq!(responses.len(), 8);
    assert!(
        responses
            .iter()
            .all(|r| r == &derive_value("another_stampede_key"))
    );
    assert_eq!(service.backend.computations(), 2);
}

#[tokio::test]
async fn test_ttl_expiry_recomputes_once() {
    let service = setup_service(|config| {
        config.cache.ttl = LATENCY;
    })
    .await;

    concurrent_requests(service.addr(), "expiring_key", 3).await;
    assert_eq!(service.backend.computations(), 1);

    tokio::time::sleep(LATENCY * 2).await;

    let responses = concurrent_requests(service.addr(), "expiring_key", 5).await;
    assert!(responses.iter().all(|r| r == &derive_value("expiring_key")));
    assert_eq!(service.backend.computations(), 2);
}

/// Requests `key` from `clients` connections, each driven by its own task.
async fn spawned_requests(addr: SocketAddr, key: &str, clients: usize) -> Vec<String> {
    let barrier = std::sync::Arc::new(tokio::sync::Barrier::new(clients));
    let requests: Vec<_> = (0..clients)
        .map(|_| {
            let barrier = barrier.clone();
            let key = key.to_owned();
            tokio::spawn(async move {
                let mut client = LineClient::connect(addr).await.unwrap();
                barrier.wait().await;
                client.request(&key).await.unwrap()
            })
        })
        .collect();

    let mut responses = Vec::with_capacity(clients);
    for request in futures::future::join_all(requests).await {
        responses.push(request.unwrap());
    }
    responses
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_stampede() {
    let service = setup_service(|_| ()).await;

    for round in 0..5 {
        let key = format!("stampede_key_{round}");
        let responses = spawned_requests(service.addr(), &key, 5).await;

        assert_eq!(responses.len(), 5);
        let distinct: BTreeSet<_> = responses.iter().collect();
        assert_eq!(distinct.len(), 1, "round {round}");
        assert_eq!(responses[0], derive_value(&key));
        assert_eq!(service.backend.computations(), round + 1);
    }
    assert_eq!(service.cacher.running_computations(), 0);
}
