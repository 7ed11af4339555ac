//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, MissedTickBehavior};
use tracing::{Instrument, error};

/// Owned handle to a spawned task.
///
/// The task is aborted when the handle is dropped, unless it was detached
/// first. Awaiting the handle yields the task output.
#[derive(Debug)]
pub struct Task<T> {
    handle: JoinHandle<T>,
    detached: bool,
}

/// Periodic callback, cancelled when dropped.
///
/// The first call happens one period after creation. Ticks missed while the
/// runtime was busy are not replayed in a burst.
#[derive(Debug)]
pub struct Ticker {
    #[cfg(not(feature = "testing"))]
    _task: Task<()>,
}

// ===== impl Task =====

impl<T: Send + 'static> Task<T> {
    pub fn spawn<Fut>(future: Fut) -> Task<T>
    where
        Fut: Future<Output = T> + Send + 'static,
    {
        Task {
            handle: tokio::spawn(future),
            detached: false,
        }
    }

    /// Runs the future built by `factory`, building and running a fresh one
    /// whenever the previous one panics.
    ///
    /// Meant for receive loops fed with untrusted input: a packet that trips
    /// a bug costs one loop iteration instead of the whole loop.
    pub fn respawn_on_panic<F, Fut>(factory: F) -> Task<()>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        Task::spawn(
            async move {
                loop {
                    match Task::spawn(factory()).await {
                        Err(error) if error.is_panic() => {
                            error!("receive loop panicked, restarting");
                        }
                        Err(error) => {
                            error!(%error, "receive loop cancelled");
                            return;
                        }
                        Ok(_) => return,
                    }
                }
            }
            .in_current_span(),
        )
    }

    /// Lets the task outlive its handle.
    pub fn detach(&mut self) {
        self.detached = true;
    }
}

impl<T> Future for Task<T> {
    type Output = Result<T, JoinError>;

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx)
    }
}

impl<T> Drop for Task<T> {
    fn drop(&mut self) {
        if !self.detached {
            self.handle.abort();
        }
    }
}

// ===== impl Ticker =====

impl Ticker {
    #[cfg(not(feature = "testing"))]
    pub fn new<F, Fut>(period: Duration, mut cb: F) -> Ticker
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let task = Task::spawn(
            async move {
                let start = time::Instant::now() + period;
                let mut interval = time::interval_at(start, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    interval.tick().await;
                    cb().await;
                }
            }
            .in_current_span(),
        );

        Ticker { _task: task }
    }

    /// Unit tests drive the clock by hand.
    #[cfg(feature = "testing")]
    pub fn new<F, Fut>(_period: Duration, _cb: F) -> Ticker
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        Ticker {}
    }
}

// ===== unit tests =====

#[cfg(all(test, not(feature = "testing")))]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn respawn_after_panic() {
        let runs = Arc::new(AtomicUsize::new(0));
        let task = {
            let runs = runs.clone();
            Task::respawn_on_panic(move || {
                let runs = runs.clone();
                async move {
                    if runs.fetch_add(1, Ordering::SeqCst) == 0 {
                        panic!("malformed input");
                    }
                }
            })
        };
        task.await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn dropped_task_is_aborted() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let task = Task::spawn(async move {
            std::future::pending::<()>().await;
            let _ = tx.send(());
        });
        drop(task);
        assert!(rx.await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_period() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let _ticker = {
            let ticks = ticks.clone();
            Ticker::new(Duration::from_secs(1), move || {
                let ticks = ticks.clone();
                async move {
                    ticks.fetch_add(1, Ordering::SeqCst);
                }
            })
        };
        time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }
}
