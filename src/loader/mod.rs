//! Batched primary-key loader
//!
//! Concurrent point reads against the same model are collected and sent as
//! one batch-get. When a batch is sent is decided by an injected
//! [`FlushScheduler`]:
//!
//! - [`YieldScheduler`]: one cooperative yield
//! - [`TimerScheduler`]: a fixed window
//! - [`ManualScheduler`]: only on an explicit `flush()`

mod batch_loader;
mod scheduler;

pub use batch_loader::BatchLoader;
pub use scheduler::{FlushScheduler, ManualScheduler, TickFuture, TimerScheduler, YieldScheduler};
