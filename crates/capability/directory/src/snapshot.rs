//! 目录快照与原子替换实现
//!
//! 功能：
//! - 不可变快照：设备名称索引 + 设备点位表
//! - 整体重载（文件变更）
//! - 增量更新（设备/点位的新增、修改、删除），写时复制

use crate::error::DirectoryError;
use crate::traits::DeviceDirectory;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use domain::{DeviceId, DevicePoints, PointDescriptor, PointId};
use std::collections::HashMap;
use std::sync::Arc;

/// 某一时刻的设备目录。
#[derive(Debug, Clone, Default)]
pub struct DirectorySnapshot {
    device_ids: HashMap<String, DeviceId>,
    device_names: HashMap<DeviceId, String>,
    points: HashMap<DeviceId, Arc<DevicePoints>>,
}

impl DirectorySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// 构造时添加设备（链式）。
    pub fn with_device(
        mut self,
        device_id: DeviceId,
        name: impl Into<String>,
        points: impl IntoIterator<Item = PointDescriptor>,
    ) -> Self {
        self.upsert_device(device_id, name, points);
        self
    }

    /// 新增或替换设备及其全部点位。
    ///
    /// 同一设备改名时旧名称随之失效。
    pub fn upsert_device(
        &mut self,
        device_id: DeviceId,
        name: impl Into<String>,
        points: impl IntoIterator<Item = PointDescriptor>,
    ) {
        let name = name.into().trim().to_string();
        if let Some(old_name) = self.device_names.insert(device_id, name.clone()) {
            if old_name != name {
                self.device_ids.remove(&old_name);
            }
        }
        self.device_ids.insert(name, device_id);
        let points: DevicePoints = points
            .into_iter()
            .map(|point| (point.id, point.resolve_metadata()))
            .collect();
        self.points.insert(device_id, Arc::new(points));
    }

    pub fn remove_device(&mut self, device_id: DeviceId) -> bool {
        let Some(name) = self.device_names.remove(&device_id) else {
            return false;
        };
        self.device_ids.remove(&name);
        self.points.remove(&device_id);
        true
    }

    /// 新增或替换单个点位；设备不存在时返回 false。
    pub fn upsert_point(&mut self, device_id: DeviceId, point: PointDescriptor) -> bool {
        let Some(points) = self.points.get_mut(&device_id) else {
            return false;
        };
        Arc::make_mut(points).insert(point.id, point.resolve_metadata());
        true
    }

    pub fn remove_point(&mut self, device_id: DeviceId, point_id: PointId) -> bool {
        match self.points.get_mut(&device_id) {
            Some(points) => Arc::make_mut(points).remove(&point_id).is_some(),
            None => false,
        }
    }

    pub fn device_id(&self, name: &str) -> Option<DeviceId> {
        self.device_ids.get(name.trim()).copied()
    }

    pub fn points(&self, device_id: DeviceId) -> Option<Arc<DevicePoints>> {
        self.points.get(&device_id).cloned()
    }

    pub fn device_count(&self) -> usize {
        self.device_names.len()
    }

    pub fn point_count(&self) -> usize {
        self.points.values().map(|points| points.len()).sum()
    }
}

/// 基于快照的设备目录。
///
/// 读取为无锁的指针加载；写入构造新快照后原子替换。
pub struct SnapshotDirectory {
    current: ArcSwap<DirectorySnapshot>,
}

impl SnapshotDirectory {
    pub fn new(snapshot: DirectorySnapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(snapshot),
        }
    }

    /// 当前快照。
    pub fn snapshot(&self) -> Arc<DirectorySnapshot> {
        self.current.load_full()
    }

    /// 整体替换快照。
    pub fn replace(&self, snapshot: DirectorySnapshot) {
        self.current.store(Arc::new(snapshot));
    }

    /// 在当前快照副本上执行更新并原子替换，返回更新函数的结果。
    ///
    /// 并发写入时更新函数可能被重复调用，必须是幂等的。
    pub fn update<F>(&self, f: F) -> bool
    where
        F: Fn(&mut DirectorySnapshot) -> bool,
    {
        let mut changed = false;
        self.current.rcu(|current| {
            let mut next = DirectorySnapshot::clone(current);
            changed = f(&mut next);
            next
        });
        changed
    }

    pub fn upsert_device(&self, device_id: DeviceId, name: &str, points: &[PointDescriptor]) {
        self.update(|snapshot| {
            snapshot.upsert_device(device_id, name, points.iter().cloned());
            true
        });
    }

    pub fn remove_device(&self, device_id: DeviceId) -> bool {
        self.update(|snapshot| snapshot.remove_device(device_id))
    }

    pub fn upsert_point(&self, device_id: DeviceId, point: &PointDescriptor) -> bool {
        self.update(|snapshot| snapshot.upsert_point(device_id, point.clone()))
    }

    pub fn remove_point(&self, device_id: DeviceId, point_id: PointId) -> bool {
        self.update(|snapshot| snapshot.remove_point(device_id, point_id))
    }
}

impl Default for SnapshotDirectory {
    fn default() -> Self {
        Self::new(DirectorySnapshot::new())
    }
}

#[async_trait]
impl DeviceDirectory for SnapshotDirectory {
    async fn resolve_device_id(&self, name: &str) -> Result<Option<DeviceId>, DirectoryError> {
        Ok(self.current.load().device_id(name))
    }

    async fn points_of(
        &self,
        device_id: DeviceId,
    ) -> Result<Option<Arc<DevicePoints>>, DirectoryError> {
        Ok(self.current.load().points(device_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{AttributeType, ValueKind};

    fn point(id: PointId) -> PointDescriptor {
        PointDescriptor::new(id, format!("p{}", id))
            .with_attribute("key", AttributeType::Hex, "62")
            .with_attribute("kind", AttributeType::String, "int32")
    }

    #[test]
    fn upsert_device_indexes_trimmed_name() {
        let snapshot = DirectorySnapshot::new().with_device(1, " dev-1 ", [point(10)]);
        assert_eq!(snapshot.device_id("dev-1"), Some(1));
        let points = snapshot.points(1).expect("points");
        assert_eq!(points.len(), 1);
        assert_eq!(points[&10].kind, Some(ValueKind::Int32));
    }

    #[test]
    fn rename_drops_old_name() {
        let mut snapshot = DirectorySnapshot::new().with_device(1, "old", [point(10)]);
        snapshot.upsert_device(1, "new", [point(10)]);
        assert_eq!(snapshot.device_id("old"), None);
        assert_eq!(snapshot.device_id("new"), Some(1));
        assert_eq!(snapshot.device_count(), 1);
    }

    #[test]
    fn point_updates_copy_on_write() {
        let mut snapshot = DirectorySnapshot::new().with_device(1, "dev", [point(10)]);
        let before = snapshot.points(1).expect("points");
        assert!(snapshot.upsert_point(1, point(11)));
        assert!(!snapshot.upsert_point(2, point(12)));
        assert_eq!(before.len(), 1);
        assert_eq!(snapshot.point_count(), 2);
        assert!(snapshot.remove_point(1, 10));
        assert!(!snapshot.remove_point(1, 10));
    }
}
