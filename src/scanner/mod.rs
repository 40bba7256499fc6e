//! Core functionality for actual scanning behaviour.
//!
//! Addresses flow one way: the address source feeds a bounded queue, a fixed
//! set of workers drain it, and each worker fans addresses out to concurrent
//! tasks behind its own limiter. Total concurrency is therefore capped at
//! `workers × tasks_per_worker`, and the full queue is what throttles the
//! producer.
mod connector;
mod reachable;
mod worker;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use connector::{ScanOutcome, ScannerConnector};
use reachable::ReachableLog;
use worker::Worker;

use crate::address::Address;
use crate::address_strategy::AddressStrategy;
use crate::errors::EngineError;
use crate::protocol::Protocol;
use crate::sink::SinkConnector;
use crate::stats::Stats;

pub const DEFAULT_TASKS_PER_WORKER: usize = 512;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(3);

/// Coordinator state. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    Draining,
    Stopped,
}

/// Engine settings. `port` overrides the protocol's default port.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub protocol: Protocol,
    pub port: Option<u16>,
    pub workers: usize,
    pub tasks_per_worker: usize,
    pub only_connect: bool,
    pub connect_timeout: Duration,
    pub scan_timeout: Duration,
    /// Connect-only mode appends reachable addresses here.
    pub reachable_output: Option<PathBuf>,
    /// Stored for reporting; dispatch is throttled only by the limiters.
    pub rate: Option<u32>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            protocol: Protocol::Http,
            port: None,
            workers: default_workers(),
            tasks_per_worker: DEFAULT_TASKS_PER_WORKER,
            only_connect: false,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
            reachable_output: None,
            rate: None,
        }
    }
}

/// Host parallelism, falling back to one worker.
pub fn default_workers() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSummary {
    /// The last address taken from the source. After a cancellation this is
    /// the first address that was not dispatched, so a later run can resume
    /// from it.
    pub last_reached: Option<Address>,
    /// Whether the source ran dry rather than being cancelled.
    pub exhausted: bool,
    pub dispatched: u64,
    pub succeeded: u64,
}

/// The scan engine.
#[derive(Debug)]
pub struct Scanner {
    workers: usize,
    tasks_per_worker: usize,
    rate: Option<u32>,
    reachable_output: Option<PathBuf>,
    connector: Arc<ScannerConnector>,
    stats: Arc<Stats>,
    phase: watch::Sender<Phase>,
}

impl Scanner {
    pub fn new(settings: ScanSettings) -> Self {
        let (phase, _) = watch::channel(Phase::Running);
        Self {
            workers: settings.workers.max(1),
            tasks_per_worker: settings.tasks_per_worker.max(1),
            rate: settings.rate,
            reachable_output: settings
                .reachable_output
                .filter(|_| settings.only_connect),
            connector: Arc::new(ScannerConnector {
                protocol: settings.protocol,
                port: settings.port.unwrap_or(settings.protocol.default_port()),
                only_connect: settings.only_connect,
                connect_timeout: settings.connect_timeout,
                scan_timeout: settings.scan_timeout,
            }),
            stats: Stats::new(),
            phase,
        }
    }

    pub fn stats(&self) -> Arc<Stats> {
        Arc::clone(&self.stats)
    }

    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    pub fn protocol(&self) -> Protocol {
        self.connector.protocol
    }

    pub fn port(&self) -> u16 {
        self.connector.port
    }

    /// Addresses buffered between the source and the workers.
    pub const fn queue_capacity(&self) -> usize {
        2 * self.tasks_per_worker * self.workers
    }

    /// Upper bound on tasks holding a socket at the same time.
    pub const fn max_in_flight(&self) -> usize {
        self.tasks_per_worker * self.workers
    }

    /// Scans every address the strategy yields.
    pub async fn run(
        &self,
        strategy: AddressStrategy,
        sinks: &dyn SinkConnector,
        shutdown: CancellationToken,
    ) -> Result<ScanSummary, EngineError> {
        self.run_with(strategy.ordered_iter(), sinks, shutdown).await
    }

    /// Scans `addresses` in the order given until they run out or
    /// `shutdown` fires, then waits for every in-flight task to finish.
    ///
    /// Sinks are opened, one per worker, before anything is dispatched; a
    /// sink that cannot be opened aborts the run.
    pub async fn run_with<I>(
        &self,
        addresses: I,
        sinks: &dyn SinkConnector,
        shutdown: CancellationToken,
    ) -> Result<ScanSummary, EngineError>
    where
        I: IntoIterator<Item = Address>,
        I::IntoIter: Send,
    {
        let collection = self.connector.protocol.name();
        let mut handles = Vec::with_capacity(self.workers);
        for _ in 0..self.workers {
            let sink = sinks
                .connect(collection)
                .await
                .map_err(EngineError::SinkUnavailable)?;
            handles.push(sink);
        }

        let reachable = match &self.reachable_output {
            Some(path) => Some(ReachableLog::open(path).await.map_err(EngineError::Output)?),
            None => None,
        };

        if let Some(rate) = self.rate {
            debug!(rate, "rate hint recorded; concurrency limits govern dispatch");
        }

        let (tx, rx) = mpsc::channel(self.queue_capacity());
        let queue = Arc::new(Mutex::new(rx));

        let mut workers = JoinSet::new();
        for (id, sink) in handles.into_iter().enumerate() {
            let worker = Worker {
                id,
                queue: Arc::clone(&queue),
                sink: Arc::from(sink),
                limiter: Arc::new(Semaphore::new(self.tasks_per_worker)),
                connector: Arc::clone(&self.connector),
                stats: Arc::clone(&self.stats),
                reachable: reachable.as_ref().map(ReachableLog::sender),
                shutdown: shutdown.clone(),
            };
            workers.spawn(worker.run());
        }

        self.enter(Phase::Running);
        info!(
            scanner = collection,
            port = self.connector.port,
            workers = self.workers,
            tasks_per_worker = self.tasks_per_worker,
            "scanning"
        );

        let mut last_reached = None;
        let mut exhausted = false;
        let mut addresses = addresses.into_iter();
        loop {
            let Some(addr) = addresses.next() else {
                exhausted = true;
                break;
            };
            last_reached = Some(addr);

            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                sent = tx.send(addr) => {
                    if sent.is_err() {
                        break;
                    }
                    self.stats.record_dispatch();
                }
            }
        }

        self.enter(Phase::Draining);
        drop(tx);
        while let Some(done) = workers.join_next().await {
            if let Err(e) = done {
                warn!(error = %e, "worker failed");
            }
        }

        if let Some(log) = reachable {
            if let Err(e) = log.finish().await {
                warn!(error = %e, "writing reachable addresses");
            }
        }

        self.enter(Phase::Stopped);
        Ok(ScanSummary {
            last_reached,
            exhausted,
            dispatched: self.stats.dispatched(),
            succeeded: self.stats.succeeded(),
        })
    }

    fn enter(&self, phase: Phase) {
        self.phase.send_replace(phase);
        info!(phase = ?phase, "engine phase");
    }
}
