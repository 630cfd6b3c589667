//! Persistent device identity
//!
//! Each player instance owns one stable device id, generated on first run
//! and stored next to its data. The id is the addressing key for targeted
//! commands and the registry record, so it must survive restarts. A
//! launch parameter can supply the id instead, which is how "permanent
//! link" style deployments pin a replacement box to an existing registry
//! record; the adopted id is then persisted like a generated one.

use crate::error::{Error, Result};
use placard_common::ids::uid;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

const DEFAULT_NAME: &str = "Unnamed display";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityRecord {
    device_id: String,
    name: String,
}

/// The device identity file, loaded once at startup
#[derive(Debug)]
pub struct Identity {
    path: PathBuf,
    record: IdentityRecord,
}

impl Identity {
    /// Load the stored identity, or bootstrap a new one.
    ///
    /// Resolution order: stored file, then the `--device-id` launch
    /// parameter, then a freshly generated id. Whatever wins is written
    /// back immediately so every later start takes the first branch. A
    /// stored identity always wins over the launch parameter; adopting a
    /// different id mid-life would orphan the registry record.
    pub fn load_or_create(
        path: &Path,
        launch_id: Option<&str>,
        launch_name: Option<&str>,
    ) -> Result<Self> {
        if let Ok(raw) = std::fs::read_to_string(path) {
            match serde_json::from_str::<IdentityRecord>(&raw) {
                Ok(record) => {
                    info!("Loaded device identity {} from {}", record.device_id, path.display());
                    return Ok(Self {
                        path: path.to_path_buf(),
                        record,
                    });
                }
                Err(e) => {
                    // Corrupt identity file: regenerate rather than refuse
                    // to start an unattended display.
                    tracing::warn!("Corrupt identity file {}: {}", path.display(), e);
                }
            }
        }

        let device_id = match launch_id {
            Some(id) if !id.is_empty() => {
                info!("Adopting device id {} from launch parameter", id);
                id.to_string()
            }
            _ => uid("device"),
        };
        let record = IdentityRecord {
            device_id,
            name: launch_name.unwrap_or(DEFAULT_NAME).to_string(),
        };

        let identity = Self {
            path: path.to_path_buf(),
            record,
        };
        identity.persist()?;
        info!("Created device identity {}", identity.record.device_id);
        Ok(identity)
    }

    pub fn device_id(&self) -> &str {
        &self.record.device_id
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    /// Persist a new display name alongside the id.
    pub fn rename(&mut self, name: &str) -> Result<()> {
        self.record.name = name.to_string();
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Identity(format!("create {}: {e}", parent.display())))?;
        }
        let raw = serde_json::to_string_pretty(&self.record)
            .map_err(|e| Error::Identity(e.to_string()))?;
        std::fs::write(&self.path, raw)
            .map_err(|e| Error::Identity(format!("write {}: {e}", self.path.display())))
    }
}
