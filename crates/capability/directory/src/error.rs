//! 目录错误类型定义

/// 设备目录错误
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// 读取目录文件失败
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 目录文件解析失败
    #[error("parse error: {0}")]
    Parse(String),

    /// 目录内容不一致（重复的设备名称或 ID 等）
    #[error("invalid directory: {0}")]
    Invalid(String),

    /// 外部目录后端不可用
    #[error("backend error: {0}")]
    Backend(String),
}
