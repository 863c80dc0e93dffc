use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use sketches_ddsketch::DDSketch;
use stampede_service::backend::SimulatedBackend;
use stampede_service::client::LineClient;

use crate::workloads::{Workload, WorkloadsConfig};

/// How much of every response is printed.
const RESPONSE_PREVIEW: usize = 50;

/// The outcome of a single workload.
#[derive(Default)]
pub struct WorkloadReport {
    /// Responses of all clients that got one, in client order.
    pub responses: Vec<String>,
    /// Clients that failed to connect or to get a response.
    pub failures: usize,
    /// Round trip times of all successful requests, in seconds.
    pub durations: DDSketch,
}

impl WorkloadReport {
    /// The number of different responses, which is `1` when all clients agreed.
    pub fn distinct_responses(&self) -> usize {
        self.responses.iter().collect::<BTreeSet<_>>().len()
    }
}

/// Returns at most the first [`RESPONSE_PREVIEW`] characters of `response`.
pub fn preview(response: &str) -> &str {
    match response.char_indices().nth(RESPONSE_PREVIEW) {
        Some((end, _)) => &response[..end],
        None => response,
    }
}

/// Makes sure that a connection to `addr` can be established.
pub async fn check_connection(addr: &str) -> Result<()> {
    LineClient::connect(addr)
        .await
        .with_context(|| format!("cannot connect to server at {addr}"))?;
    Ok(())
}

/// Requests `key` once, so that it is cached by the time the workload starts.
pub async fn warm_up(addr: &str, key: &str) -> Result<String> {
    let mut client = LineClient::connect(addr)
        .await
        .context("failed to create warmup client")?;
    client.request(key).await.context("warmup failed")
}

/// Starts all clients of `workload` at once, each on its own connection, and waits for all of
/// them to get their response.
pub async fn run_workload(addr: &str, workload: &Workload) -> WorkloadReport {
    let clients = (1..=workload.clients).map(|client_id| {
        let addr = addr.to_owned();
        let key = workload.key.clone();
        tokio::spawn(async move {
            let mut client = LineClient::connect(addr.as_str())
                .await
                .with_context(|| format!("client {client_id} failed to connect"))?;

            let start = Instant::now();
            let response = client
                .request(&key)
                .await
                .with_context(|| format!("client {client_id} request failed"))?;
            let duration = start.elapsed();

            println!(
                "Client {client_id} received: {} (took {duration:.2?})",
                preview(&response)
            );
            anyhow::Ok((response, duration))
        })
    });

    let mut report = WorkloadReport::default();
    for outcome in futures::future::join_all(clients).await {
        match outcome.context("client panicked").and_then(|outcome| outcome) {
            Ok((response, duration)) => {
                report.durations.add(duration.as_secs_f64());
                report.responses.push(response);
            }
            Err(error) => {
                println!("{error:#}");
                report.failures += 1;
            }
        }
    }

    report
}

fn print_summary(report: &WorkloadReport) {
    let ops = report.durations.count();
    println!(
        "{ops} responses received, {} distinct, {} failed",
        report.distinct_responses(),
        report.failures
    );

    if ops == 0 {
        return;
    }

    let quantile = |q| {
        let secs = report.durations.quantile(q).ok().flatten().unwrap_or_default();
        Duration::from_secs_f64(secs)
    };
    let avg = Duration::from_secs_f64(report.durations.sum().unwrap_or_default() / ops as f64);
    let p50 = quantile(0.5);
    let p90 = quantile(0.9);
    let p99 = quantile(0.99);
    println!("  avg: {avg:.2?}; p50: {p50:.2?}; p90: {p90:.2?}; p99: {p99:.2?}");
}

/// Runs all workloads one after the other against the server at `addr`.
///
/// When the server runs in-process, its `backend` is passed along to report how many
/// computations every workload caused.
pub async fn perform_stresstest(
    addr: &str,
    workloads: WorkloadsConfig,
    backend: Option<Arc<SimulatedBackend>>,
) -> Result<Vec<WorkloadReport>> {
    check_connection(addr).await?;
    println!("Connected to server at {addr}");
    println!();

    let mut reports = Vec::with_capacity(workloads.workloads.len());
    let count = workloads.workloads.len();

    for (i, workload) in workloads.workloads.iter().enumerate() {
        println!(
            "Workload {i}: {} ({} clients, key `{}`)",
            workload.name, workload.clients, workload.key
        );

        if workload.warmup {
            let response = warm_up(addr, &workload.key).await?;
            println!("Cache warmed up: {}", preview(&response));
        }

        let computations_before = backend.as_ref().map(|b| b.computations());
        let start = Instant::now();
        let report = run_workload(addr, workload).await;
        let elapsed = start.elapsed();

        print_summary(&report);
        println!("  total: {elapsed:.2?}");
        if let (Some(backend), Some(before)) = (&backend, computations_before) {
            println!("  backend computations: {}", backend.computations() - before);
        }
        println!();

        reports.push(report);

        if i + 1 < count {
            tokio::time::sleep(workload.pause).await;
        }
    }

    Ok(reports)
}
