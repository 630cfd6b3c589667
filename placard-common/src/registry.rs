//! Device registry
//!
//! Players announce themselves by periodically upserting their own record
//! into the shared device list. There is no unregister: a device that
//! stops beating simply ages out of the active window. Each upsert is a
//! read-merge-write of the whole list, so concurrent beats can race; the
//! loser's update is restored by its next beat a few seconds later.

use crate::catalog::Catalog;
use crate::model::{Device, NowPlaying};
use crate::Result;
use std::time::Duration;

/// How often a player refreshes its registry record
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// A device is active while its last beat is younger than this
pub const ACTIVE_WINDOW_MS: u64 = 15_000;

/// Fields a player reports about itself on every heartbeat
#[derive(Debug, Clone)]
pub struct DeviceBeat {
    pub id: String,
    /// Name used only when the device is first inserted
    pub name: String,
    pub user_agent: String,
    /// Deep link that adopts this device identity when opened
    pub url: String,
}

/// Registry operations over the shared device list
#[derive(Clone)]
pub struct Registry {
    catalog: Catalog,
}

impl Registry {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }

    /// Record a heartbeat, inserting the device on first sight.
    ///
    /// An existing record keeps its name, user agent, url, and creation
    /// time; only `lastSeen` and the attached now-playing snapshot move.
    /// The snapshot is read fresh from the store so the registry reflects
    /// what the player most recently published.
    pub async fn upsert_heartbeat(&self, beat: &DeviceBeat) -> Result<Device> {
        let mut devices = self.catalog.devices().await?;
        let now = crate::time::now_millis();
        let now_playing = self.catalog.now_playing().await?;

        let record = match devices.iter_mut().find(|d| d.id == beat.id) {
            Some(existing) => {
                existing.last_seen = now;
                existing.now_playing = now_playing;
                existing.clone()
            }
            None => {
                let device = Device {
                    id: beat.id.clone(),
                    name: beat.name.clone(),
                    user_agent: beat.user_agent.clone(),
                    created_at: now,
                    url: beat.url.clone(),
                    last_seen: now,
                    now_playing,
                };
                devices.push(device.clone());
                device
            }
        };

        self.catalog.save_devices(&devices).await?;
        Ok(record)
    }

    /// Rename a device's registry record. A device that has never beaten
    /// is not inserted here; the new name lands with its first beat.
    pub async fn rename(&self, device_id: &str, name: &str) -> Result<()> {
        let mut devices = self.catalog.devices().await?;
        if let Some(device) = devices.iter_mut().find(|d| d.id == device_id) {
            device.name = name.to_string();
            device.last_seen = crate::time::now_millis();
            self.catalog.save_devices(&devices).await?;
        }
        Ok(())
    }

    /// All known devices, most recently seen first.
    pub async fn devices_by_recency(&self) -> Result<Vec<Device>> {
        let mut devices = self.catalog.devices().await?;
        devices.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        Ok(devices)
    }

    /// Is the device inside the active window at `now_ms`?
    pub fn is_active(device: &Device, now_ms: u64) -> bool {
        now_ms.saturating_sub(device.last_seen) < ACTIVE_WINDOW_MS
    }
}
