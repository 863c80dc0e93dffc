use std::time::Duration;

use stampede_service::backend::derive_value;
use stampede_service::caching::Cacher;
use stampede_service::client::LineClient;
use stampede_service::config::{CoalescingMode, ServerConfig};
use stampede_service::listener;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::{concurrent_requests, setup_service};

#[tokio::test]
async fn test_single_request() {
    let service = setup_service(|_| ()).await;
    let mut client = service.connect().await;

    let response = client.request("some_key").await.unwrap();
    assert_eq!(response, derive_value("some_key"));
    assert_eq!(service.backend.computations(), 1);
}

#[tokio::test]
async fn test_multiple_requests_per_connection() {
    let service = setup_service(|_| ()).await;
    let mut client = service.connect().await;

    for key in ["first", "second", "first"] {
        client.send(key).await.unwrap();
    }

    assert_eq!(client.recv().await.unwrap().unwrap(), derive_value("first"));
    assert_eq!(client.recv().await.unwrap().unwrap(), derive_value("second"));
    assert_eq!(client.recv().await.unwrap().unwrap(), derive_value("first"));
    assert_eq!(service.backend.computations(), 2);
}

#[tokio::test]
async fn test_blank_lines_and_whitespace() {
    let service = setup_service(|_| ()).await;
    let mut client = service.connect().await;

    client.send("").await.unwrap();
    client.send("   ").await.unwrap();
    client.send("  padded_key \r").await.unwrap();

    // blank lines get no response at all
    assert_eq!(
        client.recv().await.unwrap().unwrap(),
        derive_value("padded_key")
    );
}

#[tokio::test]
async fn test_error_response() {
    let service = setup_service(|config| {
        config.backend.fail_prefix = Some("fail_".into());
    })
    .await;
    let mut client = service.connect().await;

    let response = client.request("fail_key").await.unwrap();
    assert_eq!(
        response,
        "ERROR: computation failed: backend refused key `fail_key`"
    );

    // the connection stays usable after an error
    let response = client.request("good_key").await.unwrap();
    assert_eq!(response, derive_value("good_key"));

    // errors are not cached
    client.request("fail_key").await.unwrap();
    assert_eq!(service.backend.computations(), 3);
}

#[tokio::test]
async fn test_timeout_response() {
    let service = setup_service(|config| {
        config.cache.computation_timeout = Some(Duration::from_millis(100));
    })
    .await;
    let mut client = service.connect().await;

    let response = client.request("slow_key").await.unwrap();
    assert_eq!(response, "ERROR: computation timed out after 100ms");
}

#[tokio::test]
async fn test_line_too_long() {
    let service = setup_service(|config| {
        config.server = ServerConfig {
            max_line_length: 16,
            ..Default::default()
        };
    })
    .await;
    let mut client = service.connect().await;

    client.send(&"x".repeat(32)).await.unwrap();
    assert_eq!(
        client.recv().await.unwrap().unwrap(),
        "ERROR: request exceeds 16 bytes"
    );
    assert_eq!(client.recv().await.unwrap(), None);
    assert_eq!(service.backend.computations(), 0);
}

#[tokio::test]
async fn test_invalid_utf8() {
    let service = setup_service(|_| ()).await;
    let stream = TcpStream::connect(service.addr()).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    writer.write_all(b"\xff\xfe\n").await.unwrap();

    let mut response = String::new();
    reader.read_line(&mut response).await.unwrap();
    assert_eq!(response, "ERROR: request is not valid UTF-8\n");

    // the connection is closed after the error
    response.clear();
    assert_eq!(reader.read_line(&mut response).await.unwrap(), 0);
    assert_eq!(service.backend.computations(), 0);
}

#[tokio::test]
async fn test_concurrent_connections_coalesce() {
    let service = setup_service(|_| ()).await;

    let responses = concurrent_requests(service.addr(), "stampede_key", 5).await;

    assert_eq!(responses.len(), 5);
    for response in &responses {
        assert_eq!(response, &derive_value("stampede_key"));
    }
    assert_eq!(service.backend.computations(), 1);
    assert_eq!(service.cacher.running_computations(), 0);
}

#[tokio::test]
async fn test_concurrent_connections_naive() {
    let service = setup_service(|config| {
        config.cache.mode = CoalescingMode::Naive;
    })
    .await;

    let responses = concurrent_requests(service.addr(), "stampede_key", 5).await;

    assert!(responses.iter().all(|r| r == &derive_value("stampede_key")));
    assert_eq!(service.backend.computations(), 5);
}

#[tokio::test]
async fn test_client_disconnect_during_computation() {
    let service = setup_service(|_| ()).await;

    // the first client starts the computation and goes away before it finishes
    let mut impatient = service.connect().await;
    impatient.send("abandoned_key").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(impatient);

    let mut patient = service.connect().await;
    let response = patient.request("abandoned_key").await.unwrap();
    assert_eq!(response, derive_value("abandoned_key"));

    // the computation of the departed client is shared, not repeated
    assert_eq!(service.backend.computations(), 1);
}

#[tokio::test]
async fn test_shutdown() {
    stampede_test::setup();

    let socket = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let cacher = Cacher::new(
        Default::default(),
        std::sync::Arc::new(stampede_service::backend::SimulatedBackend::new(
            Duration::from_millis(10),
        )),
    );

    let (shutdown, signal) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(listener::serve(
        socket,
        cacher,
        ServerConfig::default(),
        async move {
            signal.await.ok();
        },
    ));

    let mut client = LineClient::connect(addr).await.unwrap();
    assert_eq!(client.request("key").await.unwrap(), derive_value("key"));

    drop(client);
    shutdown.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(1), server)
        .await
        .unwrap()
        .unwrap();

    assert!(LineClient::connect(addr).await.is_err());
}
