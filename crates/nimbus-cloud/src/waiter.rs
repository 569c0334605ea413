//! Bounded status polling (exponential backoff)
//!
//! The poller only waits; it never retries a failed call. A probe error ends the wait
//! immediately, and running out of time is reported as [`WaitOutcome::TimedOut`] so the caller
//! can pick the matching timeout error.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// Monotonic time source and sleeper
#[async_trait]
pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary fixed origin
    fn now(&self) -> Duration;

    async fn sleep(&self, duration: Duration);
}

/// [`Clock`] backed by the tokio timer
pub struct TokioClock {
    origin: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Backoff schedule between probes
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl PollConfig {
    /// Delay before probe `attempt + 1`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let delay = self.initial_delay.as_secs_f64() * factor;
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }
}

/// Result of one probe
#[derive(Debug)]
pub enum Probe<T> {
    Ready(T),
    Pending(T),
}

/// How a wait ended
#[derive(Debug, PartialEq, Eq)]
pub enum WaitOutcome<T> {
    Ready(T),
    /// The deadline passed; carries the last pending observation
    TimedOut(T),
}

/// Runs probes until one is ready or the timeout elapses
pub struct Poller<'a> {
    clock: &'a dyn Clock,
    config: PollConfig,
}

impl<'a> Poller<'a> {
    pub fn new(clock: &'a dyn Clock, config: PollConfig) -> Self {
        Self { clock, config }
    }

    /// Probe immediately, then keep probing with backoff until `probe` reports ready.
    ///
    /// The last sleep is shortened so no probe is issued after the deadline. A timeout too
    /// large to represent as a deadline never expires.
    pub async fn poll<T, E, F, Fut>(
        &self,
        timeout: Duration,
        mut probe: F,
    ) -> Result<WaitOutcome<T>, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Probe<T>, E>>,
    {
        let deadline = self
            .clock
            .now()
            .checked_add(timeout)
            .unwrap_or(Duration::MAX);
        let mut attempt: u32 = 0;

        loop {
            let last = match probe().await? {
                Probe::Ready(value) => return Ok(WaitOutcome::Ready(value)),
                Probe::Pending(value) => value,
            };

            let now = self.clock.now();
            if now >= deadline {
                tracing::debug!("Wait timed out after {} probe(s)", attempt + 1);
                return Ok(WaitOutcome::TimedOut(last));
            }

            let delay = self.config.delay_for_attempt(attempt).min(deadline - now);
            tracing::debug!("Probe {} pending, sleeping {:?}", attempt + 1, delay);
            self.clock.sleep(delay).await;
            attempt = attempt.saturating_add(1);
        }
    }
}
