//! 目录文件加载与周期重载
//!
//! 文件格式：
//!
//! ```json
//! { "devices": [ { "id": 1, "name": "ListeningVirtualDevice",
//!     "points": [ { "id": 11, "name": "altitude", "kind": "float32",
//!                   "attributes": { "key":   {"type": "hex", "value": "62"},
//!                                   "start": {"type": "int", "value": "23"},
//!                                   "end":   {"type": "int", "value": "27"} } } ] } ] }
//! ```

use crate::error::DirectoryError;
use crate::snapshot::{DirectorySnapshot, SnapshotDirectory};
use domain::{DeviceId, PointDescriptor};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// 目录文件顶层结构
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryDocument {
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

/// 单个设备条目
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceEntry {
    pub id: DeviceId,
    pub name: String,
    #[serde(default)]
    pub points: Vec<PointDescriptor>,
}

impl DirectoryDocument {
    pub fn from_json(json: &str) -> Result<Self, DirectoryError> {
        serde_json::from_str(json).map_err(|e| DirectoryError::Parse(e.to_string()))
    }

    /// 校验并构造快照。
    ///
    /// 设备 ID、设备名称、同一设备下的点位 ID 都必须唯一。
    pub fn into_snapshot(self) -> Result<DirectorySnapshot, DirectoryError> {
        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        let mut snapshot = DirectorySnapshot::new();

        for device in self.devices {
            let name = device.name.trim().to_string();
            if name.is_empty() {
                return Err(DirectoryError::Invalid(format!(
                    "device {} has an empty name",
                    device.id
                )));
            }
            if !ids.insert(device.id) {
                return Err(DirectoryError::Invalid(format!(
                    "duplicate device id: {}",
                    device.id
                )));
            }
            if !names.insert(name.clone()) {
                return Err(DirectoryError::Invalid(format!(
                    "duplicate device name: {}",
                    name
                )));
            }

            let mut point_ids = HashSet::new();
            for point in &device.points {
                if !point_ids.insert(point.id) {
                    return Err(DirectoryError::Invalid(format!(
                        "duplicate point id {} on device {}",
                        point.id, device.id
                    )));
                }
            }

            snapshot.upsert_device(device.id, name, device.points);

            if let Some(points) = snapshot.points(device.id) {
                for point in points.values().filter(|point| point.kind.is_none()) {
                    warn!(
                        target: "vlisten.directory",
                        device_id = device.id,
                        point_id = point.id,
                        point_name = %point.name,
                        "point_kind_missing"
                    );
                }
            }
        }

        Ok(snapshot)
    }
}

/// 从 JSON 文件加载目录快照。
pub fn load_snapshot_file(path: impl AsRef<Path>) -> Result<DirectorySnapshot, DirectoryError> {
    let content = std::fs::read_to_string(path.as_ref())?;
    DirectoryDocument::from_json(&content)?.into_snapshot()
}

async fn reload_snapshot_file(path: &Path) -> Result<DirectorySnapshot, DirectoryError> {
    let content = tokio::fs::read_to_string(path).await?;
    DirectoryDocument::from_json(&content)?.into_snapshot()
}

/// 周期性重载目录文件。
///
/// 加载失败时保留当前快照，只记录告警。
pub fn spawn_reload(
    directory: Arc<SnapshotDirectory>,
    path: PathBuf,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // interval 的第一次 tick 立即完成，启动时已加载过一次
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match reload_snapshot_file(&path).await {
                Ok(snapshot) => {
                    let devices = snapshot.device_count();
                    let points = snapshot.point_count();
                    directory.replace(snapshot);
                    info!(
                        target: "vlisten.directory",
                        path = %path.display(),
                        devices,
                        points,
                        "directory_reloaded"
                    );
                }
                Err(err) => {
                    warn!(
                        target: "vlisten.directory",
                        path = %path.display(),
                        error = %err,
                        "directory_reload_failed"
                    );
                }
            }
        }
    })
}
