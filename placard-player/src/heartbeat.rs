//! Heartbeat service
//!
//! Keeps this instance's registry record fresh: one beat immediately on
//! startup, one every five seconds, one whenever the engine nudges us
//! (command receipt), and a final beat on shutdown so the record carries
//! the last state the device was in.

use placard_common::registry::{DeviceBeat, Registry, HEARTBEAT_INTERVAL};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

pub struct HeartbeatService {
    registry: Registry,
    beat: DeviceBeat,
    nudge: mpsc::Receiver<()>,
    shutdown: watch::Receiver<bool>,
}

impl HeartbeatService {
    pub fn new(
        registry: Registry,
        beat: DeviceBeat,
        nudge: mpsc::Receiver<()>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            registry,
            beat,
            nudge,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        info!("Heartbeat service started for device {}", self.beat.id);

        // The interval's first tick fires immediately, covering the
        // startup beat.
        let mut tick = interval(HEARTBEAT_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.beat_once().await;
                }
                Some(()) = self.nudge.recv() => {
                    debug!("Forced heartbeat");
                    self.beat_once().await;
                }
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        // Final beat on the way out so lastSeen reflects a clean stop
        self.beat_once().await;
        info!("Heartbeat service stopped");
    }

    async fn beat_once(&self) {
        if let Err(e) = self.registry.upsert_heartbeat(&self.beat).await {
            // Stale registry data is tolerable; the next beat retries
            warn!("Heartbeat failed: {}", e);
        }
    }
}

/// Build this instance's heartbeat payload.
pub fn device_beat(device_id: &str, name: &str, port: u16) -> DeviceBeat {
    DeviceBeat {
        id: device_id.to_string(),
        name: name.to_string(),
        user_agent: format!(
            "placard-player/{} ({})",
            env!("CARGO_PKG_VERSION"),
            std::env::consts::OS
        ),
        url: format!("http://127.0.0.1:{port}/player?deviceId={device_id}"),
    }
}
