//! Run-wide counters and the periodic throughput reporter.
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::sync::OwnedSemaphorePermit;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

/// Counters shared by every worker. All access goes through atomics.
#[derive(Debug, Default)]
pub struct Stats {
    dispatched: AtomicU64,
    succeeded: AtomicU64,
    window: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl Stats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_dispatch(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        self.window.fetch_add(1, Ordering::Relaxed);
    }

    /// Successes since the previous call; resets the window to zero.
    pub fn take_window(&self) -> u64 {
        self.window.swap(0, Ordering::Relaxed)
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of tasks that held a concurrency slot at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Ties a concurrency slot to the in-flight gauge. The slot is released
    /// and the gauge decremented when the returned guard drops.
    pub fn hold(self: &Arc<Self>, permit: OwnedSemaphorePermit) -> SlotGuard {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        SlotGuard {
            stats: Arc::clone(self),
            _permit: permit,
        }
    }
}

/// A held concurrency slot.
#[derive(Debug)]
pub struct SlotGuard {
    stats: Arc<Stats>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Renders throughput on a spinner every `interval` until `stop` fires.
pub fn spawn_reporter(
    stats: Arc<Stats>,
    interval: Duration,
    quiet: bool,
    stop: CancellationToken,
) -> JoinHandle<()> {
    let bar = ProgressBar::new_spinner();
    if quiet {
        bar.set_draw_target(ProgressDrawTarget::hidden());
    }
    if let Ok(style) = ProgressStyle::with_template("{spinner:.blue} [{elapsed_precise}] {msg}") {
        bar.set_style(style);
    }

    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                () = stop.cancelled() => break,
                _ = ticker.tick() => {
                    let rate = stats.take_window();
                    bar.set_message(format!(
                        "{rate}/s | saved {} | dispatched {} | in flight {}",
                        stats.succeeded(),
                        stats.dispatched(),
                        stats.in_flight(),
                    ));
                    bar.tick();
                }
            }
        }
        bar.finish_and_clear();
    })
}

#[cfg(test)]
mod tests {
    use super::{spawn_reporter, Stats};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Semaphore;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn window_resets_on_take() {
        let stats = Stats::new();
        stats.record_success();
        stats.record_success();
        assert_eq!(stats.take_window(), 2);
        assert_eq!(stats.take_window(), 0);
        assert_eq!(stats.succeeded(), 2);
    }

    #[tokio::test]
    async fn guard_tracks_peak_and_releases_slot() {
        let stats = Stats::new();
        let semaphore = Arc::new(Semaphore::new(2));

        let a = stats.hold(Arc::clone(&semaphore).acquire_owned().await.unwrap());
        let b = stats.hold(Arc::clone(&semaphore).acquire_owned().await.unwrap());
        assert_eq!(stats.in_flight(), 2);
        assert_eq!(semaphore.available_permits(), 0);

        drop(a);
        drop(b);
        assert_eq!(stats.in_flight(), 0);
        assert_eq!(stats.peak_in_flight(), 2);
        assert_eq!(semaphore.available_permits(), 2);
    }

    #[tokio::test]
    async fn reporter_stops_on_cancel() {
        let stop = CancellationToken::new();
        let handle = spawn_reporter(Stats::new(), Duration::from_millis(10), true, stop.clone());
        tokio::time::sleep(Duration::from_millis(30)).await;
        stop.cancel();
        handle.await.unwrap();
    }
}
