//! 监听驱动的核心领域模型。
//!
//! - [`Frame`]：一条设备上报的原始报文（定长头部 + 载荷）
//! - [`AttributeInfo`]：点位属性（类型标签 + 字面值）
//! - [`PointDescriptor`]：点位描述（属性表 + 显式值类型）
//! - [`Reading`]：解码后的读数，投递给下游

pub mod data;
pub mod point;

pub use data::{
    DEVICE_NAME_LEN, Frame, FrameError, HEADER_LEN, KEY_OFFSET, Reading, hex_dump, now_epoch_ms,
};
pub use point::{
    AttributeError, AttributeInfo, AttributeType, DevicePoints, PointDescriptor, ValueKind,
};

/// 设备 ID。
pub type DeviceId = u64;

/// 点位 ID。
pub type PointId = u64;
