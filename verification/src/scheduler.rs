//! Cancellable background timers: the redirect countdown and status polling.
//!
//! Both run as spawned tasks that `select!` on a cancel signal alongside their
//! tick, so dropping or cancelling a [`TimerHandle`] stops the task at its next
//! await point and no callback ever fires afterwards.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Returned by a repeating timer's tick to keep going or stop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickControl {
    Continue,
    Stop,
}

/// Owner of a running timer. Dropping it cancels the timer.
pub struct TimerHandle {
    cancel: watch::Sender<bool>,
    remaining: watch::Receiver<u64>,
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// Stop the timer. A countdown cancelled before zero never fires.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Whether the task has exited (fired, stopped, or cancelled).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Seconds left on a countdown; zero for repeating timers.
    pub fn remaining(&self) -> u64 {
        *self.remaining.borrow()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Count down from `secs`, once per second, then call `on_expire`.
///
/// Must be called from within a Tokio runtime.
pub fn start_countdown<F>(secs: u64, on_expire: F) -> TimerHandle
where
    F: FnOnce() + Send + 'static,
{
    let (cancel, mut cancel_rx) = watch::channel(false);
    let (remaining_tx, remaining) = watch::channel(secs);

    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        // First tick completes immediately.
        interval.tick().await;
        let mut left = secs;
        while left > 0 {
            tokio::select! {
                biased;
                _ = cancel_rx.changed() => {
                    debug!(left, "countdown cancelled");
                    return;
                }
                _ = interval.tick() => {
                    left -= 1;
                    let _ = remaining_tx.send(left);
                }
            }
        }
        if *cancel_rx.borrow() {
            return;
        }
        debug!(secs, "countdown expired");
        on_expire();
    });

    TimerHandle {
        cancel,
        remaining,
        task,
    }
}

/// Call `tick` every `period`, starting one period from now, until it returns
/// [`TickControl::Stop`] or the handle is cancelled.
pub fn start_repeating<F, Fut>(period: Duration, mut tick: F) -> TimerHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = TickControl> + Send + 'static,
{
    let (cancel, mut cancel_rx) = watch::channel(false);
    let (_remaining_tx, remaining) = watch::channel(0);

    let task = tokio::spawn(async move {
        let start = tokio::time::Instant::now() + period;
        let mut interval = tokio::time::interval_at(start, period);
        loop {
            tokio::select! {
                biased;
                _ = cancel_rx.changed() => {
                    debug!("repeating timer cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if tick().await == TickControl::Stop {
                        break;
                    }
                }
            }
        }
    });

    TimerHandle {
        cancel,
        remaining,
        task,
    }
}
