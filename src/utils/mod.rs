use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Logs when a pipeline step starts and how long it took once dropped.
pub struct StepTimer {
    label: &'static str,
    start: Instant,
}

impl StepTimer {
    pub fn start(label: &'static str) -> Self {
        info!("=== {} ===", label);
        Self {
            label,
            start: Instant::now(),
        }
    }
}

impl Drop for StepTimer {
    fn drop(&mut self) {
        info!("=== {} finished in {:.2?} ===", self.label, self.start.elapsed());
    }
}

/// Fixed-interval pause between outbound requests. No jitter, no backoff.
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    interval: Duration,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub async fn pause(&self) {
        if self.interval.is_zero() {
            return;
        }
        debug!("sleeping {:?}", self.interval);
        tokio::time::sleep(self.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_pacer_sleeps_full_interval() {
        let pacer = Pacer::new(Duration::from_millis(1500));
        let before = tokio::time::Instant::now();
        pacer.pause().await;
        assert!(before.elapsed() >= Duration::from_millis(1500));
    }

    #[test]
    fn test_zero_pacer_returns_immediately() {
        let pacer = Pacer::new(Duration::ZERO);
        let before = Instant::now();
        tokio_test::block_on(pacer.pause());
        assert!(before.elapsed() < Duration::from_millis(50));
    }
}
