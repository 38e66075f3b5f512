//! Exponential backoff schedule and the delay abstraction.

use async_trait::async_trait;
use std::time::Duration;

/// Delay before the next iteration after `retries` failed iterations:
/// `factor * 2^retries` seconds. No jitter and no cap.
pub fn delay(factor: f64, retries: u32) -> Duration {
    let secs = factor * 2f64.powi(retries.min(i32::MAX as u32) as i32);
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Waits out a backoff delay.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Non-blocking sleep on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Skips every delay.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSleep;

#[async_trait]
impl Sleeper for NoSleep {
    async fn sleep(&self, _duration: Duration) {}
}
