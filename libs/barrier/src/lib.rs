//! Polling barrier primitives.
//!
//! A barrier blocks until some externally owned population (registered
//! agents, published test results) reaches a required state. Key concepts:
//!
//! - **Probe**: a single observation of the external state. Every probe
//!   re-reads that state from scratch; nothing is carried between polls.
//! - **Interval**: fixed pause between probes.
//! - **Deadline**: optional upper bound on the total wait. Without one the
//!   barrier waits forever, which matches the classic blocking behaviour.
//! - **Cancellation**: an optional `watch` channel; flipping it to `true`
//!   aborts the wait at the next suspension point.
//!
//! # Invariants
//!
//! - The first probe runs immediately, so a population that is already
//!   complete is reported ready without sleeping.
//! - A probe that returns an error ends the wait with that error.
//! - A timed out barrier has always probed at least once at (or after) the
//!   deadline.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

/// Barrier errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BarrierError {
    /// The deadline passed before the barrier was satisfied.
    #[error("timeout after {elapsed:?} waiting for {resource} (last observed: {last_observed})")]
    Timeout {
        resource: String,
        elapsed: Duration,
        last_observed: String,
    },

    /// The wait was cancelled from outside.
    #[error("cancelled while waiting for {resource}")]
    Cancelled { resource: String },
}

/// Outcome of a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<T> {
    /// The barrier is satisfied.
    Ready(T),

    /// Not there yet; the string describes what was observed (for logs and
    /// timeout diagnostics).
    Pending(String),
}

/// Fixed-interval polling barrier.
#[derive(Debug, Clone)]
pub struct Barrier {
    /// Name of the thing being waited for.
    resource: String,

    /// Pause between probes.
    interval: Duration,

    /// Maximum total wait, if bounded.
    deadline: Option<Duration>,

    /// Cancellation signal.
    cancel: Option<watch::Receiver<bool>>,
}

impl Barrier {
    /// Create an unbounded, non-cancellable barrier.
    pub fn new(resource: impl Into<String>, interval: Duration) -> Self {
        Self {
            resource: resource.into(),
            interval,
            deadline: None,
            cancel: None,
        }
    }

    /// Bound the total wait. `None` keeps the barrier unbounded.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Attach a cancellation signal.
    pub fn with_cancel(mut self, cancel: Option<watch::Receiver<bool>>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Name of the resource this barrier waits for.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Poll `probe` until it reports ready.
    ///
    /// Probe errors are returned as-is; barrier failures are converted into
    /// the caller's error type.
    pub async fn wait<T, E, F, Fut>(mut self, mut probe: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Probe<T>, E>>,
        E: From<BarrierError>,
    {
        let started = Instant::now();
        let mut attempt: u64 = 0;

        loop {
            if self.is_cancelled() {
                return Err(self.cancelled_error().into());
            }

            attempt += 1;
            let last_observed = match probe().await? {
                Probe::Ready(value) => {
                    debug!(
                        resource = %self.resource,
                        attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Barrier satisfied"
                    );
                    return Ok(value);
                }
                Probe::Pending(observed) => observed,
            };

            debug!(
                resource = %self.resource,
                attempt,
                observed = %last_observed,
                "Barrier not yet satisfied"
            );

            let elapsed = started.elapsed();
            let pause = match self.deadline {
                Some(deadline) if elapsed >= deadline => {
                    return Err(BarrierError::Timeout {
                        resource: self.resource.clone(),
                        elapsed,
                        last_observed,
                    }
                    .into());
                }
                Some(deadline) => self.interval.min(deadline - elapsed),
                None => self.interval,
            };

            let interrupted = tokio::select! {
                _ = tokio::time::sleep(pause) => false,
                _ = cancelled(&mut self.cancel) => true,
            };
            if interrupted {
                return Err(self.cancelled_error().into());
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    fn cancelled_error(&self) -> BarrierError {
        BarrierError::Cancelled {
            resource: self.resource.clone(),
        }
    }
}

/// Resolves once the signal reads `true`. Never resolves without a signal,
/// or after the sender is gone.
async fn cancelled(cancel: &mut Option<watch::Receiver<bool>>) {
    let Some(rx) = cancel else {
        return std::future::pending().await;
    };

    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Barrier(BarrierError),
        Probe(&'static str),
    }

    impl From<BarrierError> for TestError {
        fn from(e: BarrierError) -> Self {
            Self::Barrier(e)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_on_first_probe_does_not_sleep() {
        let started = Instant::now();
        let result: Result<u32, TestError> = Barrier::new("agents", Duration::from_secs(5))
            .wait(|| async { Ok(Probe::Ready(6)) })
            .await;

        assert_eq!(result, Ok(6));
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_at_fixed_interval_until_ready() {
        let started = Instant::now();
        let mut calls = 0u32;
        let result: Result<u32, TestError> = Barrier::new("agents", Duration::from_secs(5))
            .wait(|| {
                calls += 1;
                let n = calls;
                async move {
                    if n < 3 {
                        Ok(Probe::Pending(format!("{n} agents")))
                    } else {
                        Ok(Probe::Ready(n))
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_produces_timeout() {
        let mut calls = 0u32;
        let result: Result<(), TestError> = Barrier::new("results", Duration::from_secs(5))
            .with_deadline(Some(Duration::from_secs(12)))
            .wait(|| {
                calls += 1;
                async { Ok(Probe::Pending("404".to_string())) }
            })
            .await;

        // Probes at 0s, 5s, 10s and 12s.
        assert_eq!(calls, 4);
        assert_eq!(
            result,
            Err(TestError::Barrier(BarrierError::Timeout {
                resource: "results".to_string(),
                elapsed: Duration::from_secs(12),
                last_observed: "404".to_string(),
            }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_error_ends_wait() {
        let result: Result<(), TestError> = Barrier::new("agents", Duration::from_secs(5))
            .wait(|| async { Err(TestError::Probe("connection refused")) })
            .await;

        assert_eq!(result, Err(TestError::Probe("connection refused")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_sleep() {
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let waiter = tokio::spawn(async move {
            Barrier::new("agents", Duration::from_secs(60))
                .with_cancel(Some(cancel_rx))
                .wait(|| async { Ok::<Probe<()>, TestError>(Probe::Pending("0".to_string())) })
                .await
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel_tx.send(true).unwrap();

        let result = waiter.await.unwrap();
        assert_eq!(
            result,
            Err(TestError::Barrier(BarrierError::Cancelled {
                resource: "agents".to_string(),
            }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_cancelled_skips_probe() {
        let (_cancel_tx, cancel_rx) = watch::channel(true);
        let mut calls = 0u32;

        let result: Result<(), TestError> = Barrier::new("agents", Duration::from_secs(5))
            .with_cancel(Some(cancel_rx))
            .wait(|| {
                calls += 1;
                async { Ok(Probe::Ready(())) }
            })
            .await;

        assert_eq!(calls, 0);
        assert!(matches!(
            result,
            Err(TestError::Barrier(BarrierError::Cancelled { .. }))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_sender_keeps_waiting() {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        drop(cancel_tx);

        let mut calls = 0u32;
        let result: Result<u32, TestError> = Barrier::new("agents", Duration::from_secs(5))
            .with_cancel(Some(cancel_rx))
            .wait(|| {
                calls += 1;
                let n = calls;
                async move {
                    if n < 2 {
                        Ok(Probe::Pending("waiting".to_string()))
                    } else {
                        Ok(Probe::Ready(n))
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(2));
    }
}
