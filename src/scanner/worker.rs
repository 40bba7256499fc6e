use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::connector::{ScannerConnector, TaskContext};
use crate::address::Address;
use crate::sink::Sink;
use crate::stats::Stats;

/// One consumer of the shared queue.
///
/// Owns a sink handle and a local limiter of `tasks` slots. Every address
/// pulled from the queue waits for a slot, then runs as its own task; the
/// slot is released when that task ends, however it ends.
pub(crate) struct Worker {
    pub id: usize,
    pub queue: Arc<Mutex<mpsc::Receiver<Address>>>,
    pub sink: Arc<dyn Sink>,
    pub limiter: Arc<Semaphore>,
    pub connector: Arc<ScannerConnector>,
    pub stats: Arc<Stats>,
    pub reachable: Option<mpsc::Sender<Address>>,
    pub shutdown: CancellationToken,
}

impl Worker {
    pub async fn run(self) {
        let mut tasks = JoinSet::new();

        loop {
            let next = { self.queue.lock().await.recv().await };
            let Some(addr) = next else {
                break;
            };

            let Ok(permit) = Arc::clone(&self.limiter).acquire_owned().await else {
                break;
            };
            let slot = self.stats.hold(permit);

            let connector = Arc::clone(&self.connector);
            let sink = Arc::clone(&self.sink);
            let stats = Arc::clone(&self.stats);
            let reachable = self.reachable.clone();
            let shutdown = self.shutdown.clone();

            tasks.spawn(async move {
                let _slot = slot;
                let outcome = connector.scan_socket(addr).await;
                let ctx = TaskContext {
                    sink: sink.as_ref(),
                    stats: &stats,
                    reachable: reachable.as_ref(),
                    shutdown: &shutdown,
                };
                connector.settle(addr, outcome, &ctx).await;
            });

            while let Some(done) = tasks.try_join_next() {
                log_panic(self.id, done);
            }
        }

        debug!(worker = self.id, in_flight = tasks.len(), "queue closed, draining");
        while let Some(done) = tasks.join_next().await {
            log_panic(self.id, done);
        }

        if let Err(e) = self.sink.close().await {
            warn!(worker = self.id, error = %e, "closing sink");
        }
        debug!(worker = self.id, "worker stopped");
    }
}

fn log_panic(worker: usize, done: Result<(), tokio::task::JoinError>) {
    if let Err(e) = done {
        warn!(worker, error = %e, "scan task failed");
    }
}
