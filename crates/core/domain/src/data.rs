use crate::{DeviceId, PointId};
use serde::Serialize;
use std::fmt::Write as _;

/// 设备名称字段长度（字节）。
pub const DEVICE_NAME_LEN: usize = 22;

/// 关键字字节偏移。
pub const KEY_OFFSET: usize = 22;

/// 报文头部长度：设备名称 + 关键字。
pub const HEADER_LEN: usize = 23;

/// 报文错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("malformed frame: {len} bytes, header needs {HEADER_LEN}")]
    Malformed { len: usize },
}

/// 设备上报的一条原始报文。
///
/// 布局：`[0,22)` 设备名称（ISO-8859-1，NUL/空格填充），
/// `[22,23)` 关键字，`[23,..)` 载荷（由点位元数据解释）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8>,
    received_at_ms: i64,
}

impl Frame {
    /// 校验头部长度并构造报文。
    pub fn parse(bytes: impl Into<Vec<u8>>, received_at_ms: i64) -> Result<Self, FrameError> {
        let bytes = bytes.into();
        if bytes.len() < HEADER_LEN {
            return Err(FrameError::Malformed { len: bytes.len() });
        }
        Ok(Self {
            bytes,
            received_at_ms,
        })
    }

    /// 设备名称（去除两端 NUL 与空白填充）。
    pub fn device_name(&self) -> String {
        let name: String = self.bytes[..DEVICE_NAME_LEN]
            .iter()
            .map(|b| char::from(*b))
            .collect();
        name.trim_matches(|c: char| c == '\0' || c.is_whitespace())
            .to_string()
    }

    /// 关键字字节。
    pub fn key(&self) -> u8 {
        self.bytes[KEY_OFFSET]
    }

    /// 关键字的规范十六进制表示（两位小写）。
    pub fn key_hex(&self) -> String {
        format!("{:02x}", self.key())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn received_at_ms(&self) -> i64 {
        self.received_at_ms
    }
}

/// 解码后的点位读数。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub device_id: DeviceId,
    pub point_id: PointId,
    /// 字段编解码得到的原始字符串值。
    pub raw_value: String,
    /// 经缩放/偏移处理后的值；未配置时与 `raw_value` 相同。
    pub value: String,
    #[serde(rename = "timestamp")]
    pub ts_ms: i64,
}

/// 大写十六进制转储（空格分隔），用于日志。
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (idx, b) in bytes.iter().enumerate() {
        if idx > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{:02X}", b);
    }
    out
}

/// 获取当前时间戳（毫秒）
pub fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
