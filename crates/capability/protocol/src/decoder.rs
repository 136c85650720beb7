//! 报文解码
//!
//! 对一条报文，遍历设备的全部点位：
//!
//! 1. 点位 `key` 属性与报文关键字（偏移 22）不一致的跳过；
//! 2. 读取 `start`（以及文本类型的 `end`）偏移；
//! 3. 由 [`KindSelector`] 选出值类型，交给字段编解码；
//! 4. 每个成功解码的点位产生一条 [`Reading`]。
//!
//! 单个点位失败只跳过该点位并记录告警，同一报文的其余点位照常解码。

use crate::codec::{CodecError, decode_field};
use domain::{
    AttributeError, DeviceId, DevicePoints, Frame, PointDescriptor, PointId, Reading, ValueKind,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use vlisten_directory::{DeviceDirectory, DirectoryError};
use vlisten_telemetry::record_point_skipped;

/// 点位值类型选择策略。
pub trait KindSelector: Send + Sync {
    fn select(&self, point: &PointDescriptor) -> Option<ValueKind>;
}

/// 使用点位描述中显式声明的值类型。
#[derive(Debug, Default, Clone, Copy)]
pub struct DeclaredKind;

impl KindSelector for DeclaredKind {
    fn select(&self, point: &PointDescriptor) -> Option<ValueKind> {
        point.kind
    }
}

/// 按点位 ID 覆盖值类型，未覆盖的回落到声明值。
#[derive(Debug, Default, Clone)]
pub struct PointKindOverrides {
    overrides: HashMap<PointId, ValueKind>,
}

impl PointKindOverrides {
    pub fn new(overrides: HashMap<PointId, ValueKind>) -> Self {
        Self { overrides }
    }

    pub fn insert(&mut self, point_id: PointId, kind: ValueKind) {
        self.overrides.insert(point_id, kind);
    }
}

impl KindSelector for PointKindOverrides {
    fn select(&self, point: &PointDescriptor) -> Option<ValueKind> {
        self.overrides.get(&point.id).copied().or(point.kind)
    }
}

/// 单个点位的解码失败原因。
#[derive(Debug, thiserror::Error)]
pub enum FieldError {
    #[error("attribute error: {0}")]
    Attribute(#[from] AttributeError),
    #[error("no value kind configured")]
    MissingKind,
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// 报文解码器。
///
/// 无状态、可重入，可在任意多个连接间共享。
#[derive(Clone)]
pub struct FrameDecoder {
    directory: Arc<dyn DeviceDirectory>,
    selector: Arc<dyn KindSelector>,
}

impl FrameDecoder {
    pub fn new(directory: Arc<dyn DeviceDirectory>) -> Self {
        Self::with_selector(directory, Arc::new(DeclaredKind))
    }

    pub fn with_selector(
        directory: Arc<dyn DeviceDirectory>,
        selector: Arc<dyn KindSelector>,
    ) -> Self {
        Self {
            directory,
            selector,
        }
    }

    /// 解码一条报文；设备没有点位时返回空。
    pub async fn decode(
        &self,
        frame: &Frame,
        device_id: DeviceId,
    ) -> Result<Vec<Reading>, DirectoryError> {
        let Some(points) = self.directory.points_of(device_id).await? else {
            debug!(target: "vlisten.decoder", device_id, "device_has_no_points");
            return Ok(Vec::new());
        };
        Ok(self.decode_points(frame, device_id, &points))
    }

    /// 按给定点位表解码，按点位 ID 升序输出。
    pub fn decode_points(
        &self,
        frame: &Frame,
        device_id: DeviceId,
        points: &DevicePoints,
    ) -> Vec<Reading> {
        let key = frame.key();
        let mut readings = Vec::new();

        for point in points.values() {
            match point_key(point) {
                Ok(point_key) if point_key == key => {}
                Ok(_) => continue,
                Err(err) => {
                    record_point_skipped();
                    warn!(
                        target: "vlisten.decoder",
                        device_id,
                        point_id = point.id,
                        error = %err,
                        "point_key_invalid"
                    );
                    continue;
                }
            }

            match self.decode_point(frame, point) {
                Ok((raw_value, value)) => readings.push(Reading {
                    device_id,
                    point_id: point.id,
                    raw_value,
                    value,
                    ts_ms: frame.received_at_ms(),
                }),
                Err(err) => {
                    record_point_skipped();
                    warn!(
                        target: "vlisten.decoder",
                        device_id,
                        point_id = point.id,
                        point_name = %point.name,
                        frame_len = frame.len(),
                        error = %err,
                        "point_skipped"
                    );
                }
            }
        }

        readings
    }

    fn decode_point(
        &self,
        frame: &Frame,
        point: &PointDescriptor,
    ) -> Result<(String, String), FieldError> {
        let kind = self.selector.select(point).ok_or(FieldError::MissingKind)?;
        let start = point.attribute(PointDescriptor::START)?.as_offset()?;
        let end = match kind.fixed_width() {
            Some(width) => {
                // 定长类型的 `end` 可选，配置了则同样不能越过报文
                if let Some(attr) = point.attributes.get(PointDescriptor::END) {
                    let declared = attr.as_offset()?;
                    if declared > frame.len() {
                        return Err(CodecError::OutOfRange {
                            start,
                            end: declared,
                            len: frame.len(),
                        }
                        .into());
                    }
                }
                start.saturating_add(width)
            }
            None => point.attribute(PointDescriptor::END)?.as_offset()?,
        };
        let raw_value = decode_field(kind, frame.as_bytes(), start, end)?;
        let value = scaled_value(point, kind, &raw_value);
        Ok((raw_value, value))
    }
}

fn point_key(point: &PointDescriptor) -> Result<u8, AttributeError> {
    point.attribute(PointDescriptor::KEY)?.as_key()
}

/// 对数值类型应用缩放和偏移。
fn scaled_value(point: &PointDescriptor, kind: ValueKind, raw_value: &str) -> String {
    if !kind.is_numeric() || !point.has_scaling() {
        return raw_value.to_string();
    }
    let Ok(raw) = raw_value.parse::<f64>() else {
        return raw_value.to_string();
    };
    let scaled = match (point.scale, point.offset) {
        (Some(scale), Some(offset)) => raw * scale + offset,
        (Some(scale), None) => raw * scale,
        (None, Some(offset)) => raw + offset,
        (None, None) => raw,
    };
    scaled.to_string()
}
