use crate::error::DirectoryError;
use async_trait::async_trait;
use domain::{DeviceId, DevicePoints};
use std::sync::Arc;

/// 设备目录接口
///
/// 由解码链路并发读取，实现必须支持任意多个连接同时查询。
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    /// 根据设备名称解析设备 ID
    async fn resolve_device_id(&self, name: &str) -> Result<Option<DeviceId>, DirectoryError>;

    /// 查询设备的全部点位
    async fn points_of(
        &self,
        device_id: DeviceId,
    ) -> Result<Option<Arc<DevicePoints>>, DirectoryError>;
}
