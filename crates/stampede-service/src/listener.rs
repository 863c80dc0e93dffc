//! The line protocol listener.
//!
//! Clients send one key per line and get one response line per request, in request order. A
//! response is either the value for the key, or `ERROR: <message>` if it could not be computed.
//! Blank lines are skipped without a response. A connection may carry any number of requests,
//! and is closed when the client closes it, or after answering a line that is longer than the
//! configured maximum or not valid UTF-8.

use std::future::Future;
use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use crate::caching::{CacheEntry, Cacher};
use crate::config::ServerConfig;

/// Prefix of responses for failed lookups.
pub const ERROR_PREFIX: &str = "ERROR: ";

/// Formats the outcome of a lookup as a response line, without the trailing newline.
pub fn format_response(entry: CacheEntry) -> String {
    match entry {
        Ok(value) => value,
        Err(err) => format!("{ERROR_PREFIX}{err}"),
    }
}

/// Accepts connections on `listener` until `shutdown` completes.
///
/// Every connection is served on its own task, so a slow lookup only ever delays the
/// connection that asked for it. Once `shutdown` completes, no new connections are accepted, and
/// open connections get [`shutdown_timeout`](ServerConfig::shutdown_timeout) to finish.
pub async fn serve<F>(listener: TcpListener, cacher: Cacher, config: ServerConfig, shutdown: F)
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let connections = TaskTracker::new();

    loop {
        let accepted = tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => accepted,
        };

        let (stream, peer) = match accepted {
            Ok(accepted) => accepted,
            Err(err) => {
                tracing::error!(error = &err as &dyn std::error::Error, "Failed to accept connection");
                continue;
            }
        };

        metric!(counter("server.connections") += 1);

        let cacher = cacher.clone();
        let span = tracing::info_span!("connection", %peer);
        connections.spawn(
            async move {
                tracing::debug!("Accepted connection");
                match handle_connection(stream, &cacher, config.max_line_length).await {
                    Ok(()) => tracing::debug!("Connection closed"),
                    Err(err) => tracing::warn!(
                        error = &err as &dyn std::error::Error,
                        "Connection closed unexpectedly"
                    ),
                }
            }
            .instrument(span),
        );
    }

    connections.close();
    tracing::info!(
        open_connections = connections.len(),
        "Stopped accepting connections"
    );

    let drained = tokio::time::timeout(config.shutdown_timeout, connections.wait()).await;
    if drained.is_err() {
        tracing::warn!(
            open_connections = connections.len(),
            "Dropping connections still open after shutdown timeout"
        );
    }
}

/// Binds to `addr` and [`serve`]s until `shutdown` completes.
pub async fn bind_and_serve<F>(
    addr: SocketAddr,
    cacher: Cacher,
    config: ServerConfig,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()>,
{
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);
    serve(listener, cacher, config, shutdown).await;
    Ok(())
}

async fn handle_connection(
    mut stream: TcpStream,
    cacher: &Cacher,
    max_line_length: usize,
) -> Result<(), LinesCodecError> {
    let (reader, writer) = stream.split();
    let mut requests = FramedRead::new(reader, LinesCodec::new_with_max_length(max_line_length));
    let mut responses = FramedWrite::new(writer, LinesCodec::new());

    while let Some(request) = requests.next().await {
        let line = match request {
            Ok(line) => line,
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                tracing::debug!(max_line_length, "Request line too long");
                let response = format!("{ERROR_PREFIX}request exceeds {max_line_length} bytes");
                responses.send(response).await?;
                return Ok(());
            }
            Err(LinesCodecError::Io(err)) if err.kind() == std::io::ErrorKind::InvalidData => {
                tracing::debug!("Request line is not valid UTF-8");
                let response = format!("{ERROR_PREFIX}request is not valid UTF-8");
                responses.send(response).await?;
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        let key = line.trim();
        if key.is_empty() {
            continue;
        }

        let entry = cacher.lookup(key).await;
        responses.send(format_response(entry)).await?;
    }

    Ok(())
}
