//! Telemetry broadcaster, called by the control loop on every publish tick.
//!
//! One pass builds a single [`TelemetrySample`], encodes it once as a JSON
//! line and once as a binary frame, then enqueues the line on every live
//! client and sends the frame to in-process subscribers. Nothing in a
//! pass waits on a socket.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::codec::TelemetryFrame;
use crate::network::{ClientRegistry, PublishReport};
use crate::process::{ProcessSource, SensorPresence};
use crate::state::ControllerHandle;
use crate::telemetry::{TelemetrySample, now_ms};

/// Frames buffered per subscriber before the oldest are overwritten.
pub const FRAME_CHANNEL_CAPACITY: usize = 16;

pub struct TelemetryBroadcaster {
    registry: ClientRegistry,
    state: ControllerHandle,
    source: Arc<dyn ProcessSource>,
    presence: SensorPresence,
    frames: broadcast::Sender<TelemetryFrame>,
}

impl TelemetryBroadcaster {
    /// The presence map is read from `source` once, here.
    pub fn new(
        registry: ClientRegistry,
        state: ControllerHandle,
        source: Arc<dyn ProcessSource>,
    ) -> Self {
        let presence = source.presence();
        let (frames, _) = broadcast::channel(FRAME_CHANNEL_CAPACITY);
        Self {
            registry,
            state,
            source,
            presence,
            frames,
        }
    }

    pub fn presence(&self) -> SensorPresence {
        self.presence
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Receive every binary frame published from now on.
    pub fn subscribe_frames(&self) -> broadcast::Receiver<TelemetryFrame> {
        self.frames.subscribe()
    }

    /// Sender side of the frame channel, for the TCP frame stream.
    pub fn frame_sender(&self) -> broadcast::Sender<TelemetryFrame> {
        self.frames.clone()
    }

    /// Snapshot process and controller state into a sample.
    pub fn sample(&self) -> TelemetrySample {
        self.sample_at(now_ms())
    }

    pub fn sample_at(&self, timestamp_ms: u64) -> TelemetrySample {
        let process = self.source.snapshot();
        let controller = self.state.snapshot();
        TelemetrySample::build(timestamp_ms, &process, self.presence, &controller)
    }

    /// Publish one sample. Fire-and-forget: never fails and never blocks.
    pub fn publish(&self) -> PublishReport {
        self.publish_sample(&self.sample())
    }

    pub fn publish_sample(&self, sample: &TelemetrySample) -> PublishReport {
        // Err only means nobody is subscribed.
        let _ = self.frames.send(TelemetryFrame::from_sample(sample));

        if self.registry.is_empty() {
            return PublishReport::default();
        }
        let line = match sample.to_line() {
            Ok(line) => Bytes::from(line),
            Err(e) => {
                warn!("failed to encode telemetry: {e}");
                return PublishReport::default();
            }
        };

        let report = self.registry.broadcast(line);
        if report.dropped > 0 {
            debug!(
                delivered = report.delivered,
                dropped = report.dropped,
                "telemetry published"
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::network::ClientHandle;
    use crate::process::{ProcessMode, ProcessState};
    use crate::state::ControllerMode;

    struct FixedProcess(SensorPresence);

    impl ProcessSource for FixedProcess {
        fn snapshot(&self) -> ProcessState {
            ProcessState {
                mode: ProcessMode::Active,
                temp_vapour_head_degc: 78.4,
                flow_ml_min: 120.0,
                valve_reflux_percent: 40,
                ..ProcessState::default()
            }
        }

        fn presence(&self) -> SensorPresence {
            self.0
        }
    }

    fn broadcaster(presence: SensorPresence) -> TelemetryBroadcaster {
        TelemetryBroadcaster::new(
            ClientRegistry::new(),
            ControllerHandle::new(),
            Arc::new(FixedProcess(presence)),
        )
    }

    fn attach(registry: &ClientRegistry) -> mpsc::Receiver<Bytes> {
        let peer: SocketAddr = "127.0.0.1:40002".parse().unwrap();
        let (tx, rx) = mpsc::channel(8);
        registry.register(ClientHandle::new(registry.next_id(), peer, tx, CancellationToken::new()));
        rx
    }

    #[test]
    fn publish_without_clients_is_a_no_op() {
        let b = broadcaster(SensorPresence::all());
        assert_eq!(b.publish(), PublishReport::default());
    }

    #[test]
    fn sample_reflects_controller_state() {
        let b = broadcaster(SensorPresence::all());
        b.state.set_mode(ControllerMode::Active);
        let sample = b.sample_at(5);
        assert_eq!(sample.mode, ControllerMode::Active);
        assert_eq!(sample.timestamp_ms, 5);
        assert_eq!(sample.temps.vapour_head, Some(78.4));
    }

    #[test]
    fn publish_sends_one_line_per_client() {
        let b = broadcaster(SensorPresence::all());
        let mut rx1 = attach(b.registry());
        let mut rx2 = attach(b.registry());

        let report = b.publish();
        assert_eq!(report.delivered, 2);

        let line = rx1.try_recv().unwrap();
        assert_eq!(line, rx2.try_recv().unwrap());
        let text = std::str::from_utf8(&line).unwrap();
        assert!(text.starts_with("{\"version\":\"v0\",\"type\":\"telemetry\""));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn frames_reach_subscribers() {
        let b = broadcaster(SensorPresence::TEMP_VAPOUR_HEAD | SensorPresence::FLOW);
        let mut frames = b.subscribe_frames();
        b.publish();

        let frame = frames.try_recv().unwrap();
        assert_eq!(frame.temps_degc()[0], Some(78.4));
        assert_eq!(frame.temps_degc()[1], None);
        assert_eq!(frame.flow_ml_min(), Some(120.0));
        assert_eq!(frame.valves_percent(), [None, None]);
    }
}
