//! 点位元数据：属性类型标签、属性值解析与点位描述。

use crate::PointId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// 属性解析错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttributeError {
    #[error("missing attribute: {0}")]
    Missing(String),
    #[error("invalid {expected} literal: {value:?}")]
    Invalid { value: String, expected: &'static str },
    #[error("attribute type {attr_type} cannot be read as {expected}")]
    TypeMismatch {
        attr_type: AttributeType,
        expected: &'static str,
    },
}

/// 属性声明的类型标签。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    String,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Boolean,
    Hex,
}

impl AttributeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Byte => "byte",
            Self::Short => "short",
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::Boolean => "boolean",
            Self::Hex => "hex",
        }
    }

    fn is_integer(&self) -> bool {
        matches!(self, Self::Byte | Self::Short | Self::Int | Self::Long)
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 点位属性：类型标签 + 字面值。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeInfo {
    #[serde(rename = "type")]
    pub attr_type: AttributeType,
    pub value: String,
}

impl AttributeInfo {
    pub fn new(attr_type: AttributeType, value: impl Into<String>) -> Self {
        Self {
            attr_type,
            value: value.into(),
        }
    }

    /// 解析为报文内的字节偏移。
    ///
    /// 整数类型按十进制解析（`0x` 前缀按十六进制），`hex` 按十六进制，
    /// `string` 两种写法都接受。
    pub fn as_offset(&self) -> Result<usize, AttributeError> {
        let parsed = match self.attr_type {
            AttributeType::Hex => parse_hex(&self.value, "offset")?,
            t if t.is_integer() || t == AttributeType::String => {
                parse_integer(&self.value, "offset")?
            }
            attr_type => {
                return Err(AttributeError::TypeMismatch {
                    attr_type,
                    expected: "offset",
                });
            }
        };
        usize::try_from(parsed).map_err(|_| self.invalid("offset"))
    }

    /// 解析为单字节关键字。
    ///
    /// `hex` 与 `string` 按规范十六进制表示解析（如 `"62"`），
    /// 整数类型按十进制解析。
    pub fn as_key(&self) -> Result<u8, AttributeError> {
        let parsed = match self.attr_type {
            AttributeType::Hex | AttributeType::String => parse_hex(&self.value, "key")?,
            t if t.is_integer() => parse_integer(&self.value, "key")?,
            attr_type => {
                return Err(AttributeError::TypeMismatch {
                    attr_type,
                    expected: "key",
                });
            }
        };
        u8::try_from(parsed).map_err(|_| self.invalid("key"))
    }

    /// 解析为数值（缩放系数、偏移量）。
    pub fn as_f64(&self) -> Result<f64, AttributeError> {
        match self.attr_type {
            AttributeType::Boolean | AttributeType::Hex => Err(AttributeError::TypeMismatch {
                attr_type: self.attr_type,
                expected: "number",
            }),
            _ => self
                .value
                .trim()
                .parse::<f64>()
                .map_err(|_| self.invalid("number")),
        }
    }

    fn invalid(&self, expected: &'static str) -> AttributeError {
        AttributeError::Invalid {
            value: self.value.clone(),
            expected,
        }
    }
}

fn parse_hex(literal: &str, expected: &'static str) -> Result<i64, AttributeError> {
    let trimmed = literal.trim();
    let digits = strip_hex_prefix(trimmed).unwrap_or(trimmed);
    i64::from_str_radix(digits, 16).map_err(|_| AttributeError::Invalid {
        value: literal.to_string(),
        expected,
    })
}

fn parse_integer(literal: &str, expected: &'static str) -> Result<i64, AttributeError> {
    let trimmed = literal.trim();
    let parsed = match strip_hex_prefix(trimmed) {
        Some(digits) => i64::from_str_radix(digits, 16),
        None => trimmed.parse::<i64>(),
    };
    parsed.map_err(|_| AttributeError::Invalid {
        value: literal.to_string(),
        expected,
    })
}

fn strip_hex_prefix(literal: &str) -> Option<&str> {
    literal
        .strip_prefix("0x")
        .or_else(|| literal.strip_prefix("0X"))
}

/// 点位值类型：决定载荷字段的宽度与编码方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Float32,
    Float64,
    Int32,
    Int64,
    Bool,
    #[serde(rename = "text", alias = "text_range")]
    TextRange,
}

impl ValueKind {
    /// 定长类型的字节宽度；区间类型返回 `None`。
    pub fn fixed_width(&self) -> Option<usize> {
        match self {
            Self::Float32 | Self::Int32 => Some(4),
            Self::Float64 | Self::Int64 => Some(8),
            Self::Bool => Some(1),
            Self::TextRange => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, Self::Bool | Self::TextRange)
    }

    /// 从元数据中的类型名解析。
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "float32" | "float" => Some(Self::Float32),
            "float64" | "double" => Some(Self::Float64),
            "int32" | "int" => Some(Self::Int32),
            "int64" | "long" => Some(Self::Int64),
            "bool" | "boolean" => Some(Self::Bool),
            "text" | "text_range" | "string" => Some(Self::TextRange),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Bool => "bool",
            Self::TextRange => "text",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 点位描述。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointDescriptor {
    pub id: PointId,
    pub name: String,
    /// 显式值类型；加载元数据时确定，不从显示名称推断。
    #[serde(default)]
    pub kind: Option<ValueKind>,
    #[serde(default)]
    pub attributes: HashMap<String, AttributeInfo>,
    /// 缩放系数
    #[serde(default)]
    pub scale: Option<f64>,
    /// 偏移量
    #[serde(default)]
    pub offset: Option<f64>,
}

impl PointDescriptor {
    pub const KEY: &'static str = "key";
    pub const START: &'static str = "start";
    pub const END: &'static str = "end";
    pub const KIND: &'static str = "kind";
    pub const SCALE: &'static str = "scale";
    pub const OFFSET: &'static str = "offset";

    pub fn new(id: PointId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: None,
            attributes: HashMap::new(),
            scale: None,
            offset: None,
        }
    }

    pub fn with_kind(mut self, kind: ValueKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        attr_type: AttributeType,
        value: impl Into<String>,
    ) -> Self {
        self.attributes
            .insert(name.into(), AttributeInfo::new(attr_type, value));
        self
    }

    pub fn with_scaling(mut self, scale: Option<f64>, offset: Option<f64>) -> Self {
        self.scale = scale;
        self.offset = offset;
        self
    }

    /// 读取必需属性。
    pub fn attribute(&self, name: &str) -> Result<&AttributeInfo, AttributeError> {
        self.attributes
            .get(name)
            .ok_or_else(|| AttributeError::Missing(name.to_string()))
    }

    /// 补齐未显式声明的元数据：`kind`、`scale`、`offset` 依次尝试从同名属性读取。
    ///
    /// 显式字段优先；属性字面值无法解析时保持为空。
    pub fn resolve_metadata(mut self) -> Self {
        if self.kind.is_none() {
            self.kind = self
                .attributes
                .get(Self::KIND)
                .and_then(|attr| ValueKind::from_name(&attr.value));
        }
        if self.scale.is_none() {
            self.scale = self.numeric_attribute(Self::SCALE);
        }
        if self.offset.is_none() {
            self.offset = self.numeric_attribute(Self::OFFSET);
        }
        self
    }

    fn numeric_attribute(&self, name: &str) -> Option<f64> {
        self.attributes
            .get(name)
            .and_then(|attr| attr.as_f64().ok())
    }

    pub fn has_scaling(&self) -> bool {
        self.scale.is_some() || self.offset.is_some()
    }
}

/// 一个设备下的全部点位，按点位 ID 有序。
pub type DevicePoints = BTreeMap<PointId, PointDescriptor>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_parses_decimal_and_hex() {
        assert_eq!(AttributeInfo::new(AttributeType::Int, "23").as_offset(), Ok(23));
        assert_eq!(AttributeInfo::new(AttributeType::Int, "0x17").as_offset(), Ok(23));
        assert_eq!(AttributeInfo::new(AttributeType::Hex, "17").as_offset(), Ok(23));
        assert_eq!(AttributeInfo::new(AttributeType::String, " 48 ").as_offset(), Ok(48));
    }

    #[test]
    fn offset_rejects_negative_and_non_integer() {
        assert!(matches!(
            AttributeInfo::new(AttributeType::Int, "-1").as_offset(),
            Err(AttributeError::Invalid { .. })
        ));
        assert!(matches!(
            AttributeInfo::new(AttributeType::Double, "1.5").as_offset(),
            Err(AttributeError::TypeMismatch { .. })
        ));
        assert!(matches!(
            AttributeInfo::new(AttributeType::Int, "abc").as_offset(),
            Err(AttributeError::Invalid { .. })
        ));
    }

    #[test]
    fn key_uses_canonical_hex_for_string_and_hex() {
        assert_eq!(AttributeInfo::new(AttributeType::String, "62").as_key(), Ok(0x62));
        assert_eq!(AttributeInfo::new(AttributeType::Hex, "0x62").as_key(), Ok(0x62));
        assert_eq!(AttributeInfo::new(AttributeType::Hex, "0A").as_key(), Ok(0x0a));
        assert_eq!(AttributeInfo::new(AttributeType::Int, "98").as_key(), Ok(0x62));
        assert!(AttributeInfo::new(AttributeType::Int, "256").as_key().is_err());
    }

    #[test]
    fn value_kind_names() {
        assert_eq!(ValueKind::from_name("Float32"), Some(ValueKind::Float32));
        assert_eq!(ValueKind::from_name("long"), Some(ValueKind::Int64));
        assert_eq!(ValueKind::from_name("text_range"), Some(ValueKind::TextRange));
        assert_eq!(ValueKind::from_name("altitude"), None);
        assert_eq!(ValueKind::TextRange.fixed_width(), None);
        assert_eq!(ValueKind::Float64.fixed_width(), Some(8));
    }

    #[test]
    fn descriptor_deserializes_and_resolves_kind_attribute() {
        let json = r#"{
            "id": 7,
            "name": "lock",
            "attributes": {
                "key": {"type": "hex", "value": "62"},
                "start": {"type": "int", "value": "47"},
                "kind": {"type": "string", "value": "bool"}
            }
        }"#;
        let point: PointDescriptor = serde_json::from_str(json).expect("point");
        assert_eq!(point.kind, None);
        let point = point.resolve_metadata();
        assert_eq!(point.kind, Some(ValueKind::Bool));
        assert_eq!(point.attribute("start").and_then(|a| a.as_offset()), Ok(47));
        assert_eq!(
            point.attribute("end"),
            Err(AttributeError::Missing("end".to_string()))
        );
    }

    #[test]
    fn declared_kind_wins_over_attribute() {
        let point = PointDescriptor::new(1, "speed")
            .with_kind(ValueKind::Float64)
            .with_attribute("kind", AttributeType::String, "int32")
            .resolve_metadata();
        assert_eq!(point.kind, Some(ValueKind::Float64));
    }

    #[test]
    fn scaling_falls_back_to_attributes() {
        let point = PointDescriptor::new(3, "level")
            .with_attribute("scale", AttributeType::Double, "0.5")
            .with_attribute("offset", AttributeType::String, "-1")
            .resolve_metadata();
        assert_eq!(point.scale, Some(0.5));
        assert_eq!(point.offset, Some(-1.0));
        assert!(point.has_scaling());
    }

    #[test]
    fn declared_scaling_wins_and_bad_literal_is_ignored() {
        let point = PointDescriptor::new(3, "level")
            .with_scaling(Some(2.0), None)
            .with_attribute("scale", AttributeType::Double, "0.5")
            .with_attribute("offset", AttributeType::Double, "abc")
            .resolve_metadata();
        assert_eq!(point.scale, Some(2.0));
        assert_eq!(point.offset, None);

        let point = PointDescriptor::new(4, "flag")
            .with_attribute("scale", AttributeType::Boolean, "true")
            .resolve_metadata();
        assert!(!point.has_scaling());
    }

    #[test]
    fn numeric_attribute_parsing() {
        assert_eq!(AttributeInfo::new(AttributeType::Float, " 1.5 ").as_f64(), Ok(1.5));
        assert_eq!(AttributeInfo::new(AttributeType::Int, "10").as_f64(), Ok(10.0));
        assert!(matches!(
            AttributeInfo::new(AttributeType::Hex, "10").as_f64(),
            Err(AttributeError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn value_kind_serde_names() {
        let kind: ValueKind = serde_json::from_str("\"text\"").expect("kind");
        assert_eq!(kind, ValueKind::TextRange);
        let kind: ValueKind = serde_json::from_str("\"float32\"").expect("kind");
        assert_eq!(kind, ValueKind::Float32);
    }
}
