//! Flush scheduling
//!
//! A scheduler decides how long a load waits for company before the
//! pending batch is sent. It is the only timing decision in the loader.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Future returned by [`FlushScheduler::tick`]
pub type TickFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Decides when a pending batch is dispatched.
pub trait FlushScheduler: Send + Sync {
    /// Wait that closes the batch window for a load.
    ///
    /// `None` means the loader never dispatches by itself and the caller
    /// must invoke `flush()`.
    fn tick(&self) -> Option<TickFuture<'_>>;
}

/// One cooperative yield: loads issued in the same poll round coalesce
#[derive(Debug, Default, Clone, Copy)]
pub struct YieldScheduler;

impl FlushScheduler for YieldScheduler {
    fn tick(&self) -> Option<TickFuture<'_>> {
        Some(Box::pin(tokio::task::yield_now()))
    }
}

/// Fixed batching window
#[derive(Debug, Clone, Copy)]
pub struct TimerScheduler {
    window: Duration,
}

impl TimerScheduler {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl FlushScheduler for TimerScheduler {
    fn tick(&self) -> Option<TickFuture<'_>> {
        Some(Box::pin(tokio::time::sleep(self.window)))
    }
}

/// Caller-driven flushing
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualScheduler;

impl FlushScheduler for ManualScheduler {
    fn tick(&self) -> Option<TickFuture<'_>> {
        None
    }
}
