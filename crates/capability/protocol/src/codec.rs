//! 字段编解码
//!
//! 按值类型从报文字节中取出一个字段并转换为规范字符串：
//!
//! | 类型 | 宽度 | 编码 |
//! |---|---|---|
//! | float32 | 4 | 大端 IEEE-754 |
//! | float64 | 8 | 大端 IEEE-754 |
//! | int32 | 4 | 大端补码 |
//! | int64 | 8 | 大端补码 |
//! | bool | 1 | 非零为 true |
//! | text | `end - start` | ISO-8859-1，去除两端空白 |

use domain::ValueKind;

/// 字段越界或区间非法。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("field [{start}, {end}) out of frame bounds ({len} bytes)")]
    OutOfRange { start: usize, end: usize, len: usize },
    #[error("empty field range [{start}, {end})")]
    EmptyRange { start: usize, end: usize },
}

/// 解码一个字段。
///
/// 定长类型只使用 `start`，`end` 仅对 `TextRange` 有意义。
pub fn decode_field(
    kind: ValueKind,
    bytes: &[u8],
    start: usize,
    end: usize,
) -> Result<String, CodecError> {
    let value = match kind {
        ValueKind::Float32 => f32::from_be_bytes(fixed(bytes, start)?).to_string(),
        ValueKind::Float64 => f64::from_be_bytes(fixed(bytes, start)?).to_string(),
        ValueKind::Int32 => i32::from_be_bytes(fixed(bytes, start)?).to_string(),
        ValueKind::Int64 => i64::from_be_bytes(fixed(bytes, start)?).to_string(),
        ValueKind::Bool => {
            let [byte] = fixed::<1>(bytes, start)?;
            (byte != 0).to_string()
        }
        ValueKind::TextRange => text(bytes, start, end)?,
    };
    Ok(value)
}

fn fixed<const N: usize>(bytes: &[u8], start: usize) -> Result<[u8; N], CodecError> {
    let end = start.saturating_add(N);
    if end > bytes.len() {
        return Err(CodecError::OutOfRange {
            start,
            end,
            len: bytes.len(),
        });
    }
    let mut buf = [0u8; N];
    buf.copy_from_slice(&bytes[start..end]);
    Ok(buf)
}

fn text(bytes: &[u8], start: usize, end: usize) -> Result<String, CodecError> {
    if start >= end {
        return Err(CodecError::EmptyRange { start, end });
    }
    if end > bytes.len() {
        return Err(CodecError::OutOfRange {
            start,
            end,
            len: bytes.len(),
        });
    }
    let decoded: String = bytes[start..end].iter().map(|b| char::from(*b)).collect();
    Ok(decoded
        .trim_matches(|c: char| c.is_whitespace() || c.is_control())
        .to_string())
}
