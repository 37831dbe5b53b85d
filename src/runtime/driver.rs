//! Wall-clock driver for a shared [`AffectContext`].
//!
//! The context itself never sleeps. Real hosts spawn this driver, which
//! ticks at a fixed resolution and advances the context by the wall-clock
//! time that actually elapsed, carrying sub-millisecond remainders.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};

use super::context::AffectContext;

/// Running driver. Dropping it without [`DriverHandle::shutdown`] leaves
/// the task running until the runtime stops.
#[derive(Debug)]
pub struct DriverHandle {
    stop: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl DriverHandle {
    /// Ask the driver to stop after its current tick.
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    /// Stop and wait for the driver task to finish.
    pub async fn shutdown(self) -> Result<(), tokio::task::JoinError> {
        self.stop();
        self.join.await
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Spawn the driver on the current tokio runtime.
pub fn spawn_driver(context: Arc<Mutex<AffectContext>>, resolution: Duration) -> DriverHandle {
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let resolution = resolution.max(Duration::from_millis(1));

    let join = tokio::spawn(async move {
        let mut ticker = interval(resolution);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last = Instant::now();
        log::debug!("Affect driver started ({:?} resolution)", resolution);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let elapsed = last.elapsed();
                    let ms = elapsed.as_millis() as u64;
                    if ms == 0 {
                        continue;
                    }
                    last += Duration::from_millis(ms);
                    context.lock().advance(ms);
                }
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }
        log::debug!("Affect driver stopped");
    });

    DriverHandle {
        stop: stop_tx,
        join,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{SystemMetrics, SystemState};
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_driver_advances_and_stops() {
        let context = Arc::new(Mutex::new(AffectContext::default()));
        context.lock().start();
        let handle = spawn_driver(context.clone(), Duration::from_millis(5));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_ok!(handle.shutdown().await);

        let stopped_at = context.lock().now_ms();
        assert!(stopped_at > 0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(context.lock().now_ms(), stopped_at);
    }

    #[tokio::test]
    async fn test_alert_reverts_in_wall_clock_time() {
        let mut config = crate::config::AffectConfig::default();
        config.timing.alert_revert_ms = 30;
        let context = Arc::new(Mutex::new(assert_ok!(AffectContext::new(config))));
        {
            let mut ctx = context.lock();
            ctx.ingest_metrics(SystemMetrics {
                cpu: 10.0,
                ..Default::default()
            });
            ctx.emit_alert(crate::bridge::AlertSeverity::Critical, "test");
            assert_eq!(ctx.state(), SystemState::Danger);
        }
        let handle = spawn_driver(context.clone(), Duration::from_millis(2));
        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.stop();
        assert_eq!(context.lock().state(), SystemState::Stable);
    }
}
