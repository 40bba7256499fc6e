//! Per-address pipeline: connect, probe, classify, save.
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::address::Address;
use crate::errors::ScanError;
use crate::protocol::{Connection, Protocol, Response};
use crate::sink::Sink;
use crate::stats::Stats;

/// What became of a single address.
#[derive(Debug)]
pub enum ScanOutcome {
    /// The dial failed or timed out.
    Unreachable,
    /// Connect-only mode: the dial succeeded and nothing else was tried.
    Connected,
    /// Connected, but the probe produced nothing worth keeping.
    Empty,
    /// Deadline, reset or end of stream mid-probe.
    Missed,
    Success(Response),
    Error(ScanError),
}

/// Everything a task needs to probe one address. Shared read-only by all
/// tasks of every worker.
#[derive(Debug)]
pub struct ScannerConnector {
    pub(crate) protocol: Protocol,
    pub(crate) port: u16,
    pub(crate) only_connect: bool,
    pub(crate) connect_timeout: Duration,
    pub(crate) scan_timeout: Duration,
}

impl ScannerConnector {
    /// Dials the target and, unless in connect-only mode, runs the probe
    /// under the scan deadline. The connection is closed before returning.
    pub async fn scan_socket(&self, addr: Address) -> ScanOutcome {
        let target = addr.socket_addr(self.port);
        let Ok(mut conn) =
            Connection::dial(self.protocol.transport(), target, self.connect_timeout).await
        else {
            return ScanOutcome::Unreachable;
        };

        debug!(ip = %addr, "connected");

        if self.only_connect {
            conn.close().await;
            return ScanOutcome::Connected;
        }

        let result = time::timeout(self.scan_timeout, self.protocol.scan(addr, &mut conn)).await;
        conn.close().await;

        match result {
            Err(_) => ScanOutcome::Missed,
            Ok(Ok(Some(response))) if !response.payload.is_empty() => {
                ScanOutcome::Success(response)
            }
            Ok(Ok(_)) => ScanOutcome::Empty,
            Ok(Err(e)) if e.is_expected() => ScanOutcome::Missed,
            Ok(Err(e)) => ScanOutcome::Error(e),
        }
    }

    /// Acts on an outcome: saves successes, counts them, and reports
    /// anything unexpected. Reports are muted once shutdown has begun.
    pub async fn settle(
        &self,
        addr: Address,
        outcome: ScanOutcome,
        ctx: &TaskContext<'_>,
    ) {
        match outcome {
            ScanOutcome::Connected => {
                ctx.stats.record_success();
                if let Some(reachable) = ctx.reachable {
                    let _ = reachable.send(addr).await;
                }
            }
            ScanOutcome::Success(response) => {
                match self.protocol.save(addr, &response, ctx.sink).await {
                    Ok(()) => {
                        ctx.stats.record_success();
                        info!(ip = %addr, latency_ms = response.latency_ms(), "saved");
                    }
                    Err(e) if !ctx.shutdown.is_cancelled() => {
                        warn!(ip = %addr, error = %e, "save failed");
                    }
                    Err(_) => {}
                }
            }
            ScanOutcome::Error(e) if !ctx.shutdown.is_cancelled() => {
                warn!(ip = %addr, error = %e, "scan failed");
            }
            ScanOutcome::Error(_)
            | ScanOutcome::Unreachable
            | ScanOutcome::Empty
            | ScanOutcome::Missed => {}
        }
    }
}

/// Borrowed per-worker resources handed to [`ScannerConnector::settle`].
pub struct TaskContext<'a> {
    pub sink: &'a dyn Sink,
    pub stats: &'a Stats,
    pub reachable: Option<&'a mpsc::Sender<Address>>,
    pub shutdown: &'a CancellationToken,
}
