//! The fixed-rate control loop that drives the process and the
//! telemetry broadcaster.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use equilibria_ipc::TelemetryBroadcaster;

use crate::process::SimulatedProcess;

pub struct ControlLoop {
    tick: Duration,
    publish_interval: Duration,
    /// Publish on every n-th tick.
    publish_every: u64,
    process: Arc<SimulatedProcess>,
    broadcaster: Arc<TelemetryBroadcaster>,
}

impl ControlLoop {
    pub fn new(
        tick: Duration,
        publish_interval: Duration,
        process: Arc<SimulatedProcess>,
        broadcaster: Arc<TelemetryBroadcaster>,
    ) -> Self {
        Self {
            tick,
            publish_interval,
            publish_every: ticks_per_publish(tick, publish_interval),
            process,
            broadcaster,
        }
    }

    /// Tick until `shutdown` is cancelled.
    ///
    /// Publishing is fire-and-forget, so a slow or dead client can never
    /// stretch a tick.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            tick_ms = self.tick.as_millis() as u64,
            publish_ms = self.publish_interval.as_millis() as u64,
            "control loop started"
        );
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks: u64 = 0;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            self.process.step(self.tick);

            if self.publishes_on(ticks) {
                let report = self.broadcaster.publish();
                if report.delivered + report.dropped > 0 {
                    debug!(delivered = report.delivered, dropped = report.dropped, "telemetry tick");
                }
            }
            ticks = ticks.wrapping_add(1);
        }
        info!("control loop stopped");
    }

    /// Whether tick number `tick` (from 0) publishes telemetry.
    fn publishes_on(&self, tick: u64) -> bool {
        tick % self.publish_every == 0
    }
}

/// Publish interval in whole ticks, rounded to nearest and at least one.
fn ticks_per_publish(tick: Duration, interval: Duration) -> u64 {
    let tick = tick.as_nanos().max(1);
    let ticks = (interval.as_nanos() + tick / 2) / tick;
    u64::try_from(ticks).unwrap_or(u64::MAX).max(1)
}
