//! Environment abstraction for deterministic testing.
//!
//! Decouples the router's fan-out/timeout logic from real wall-clock time so
//! tests can simulate slow or hanging trackers without actually sleeping.

use std::future::Future;
use std::time::Duration;

/// Abstract environment providing time and sleep for router fan-out.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Sleeps for the specified duration.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

/// Production environment backed by the Tokio runtime's real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioEnvironment;

impl Environment for TokioEnvironment {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
