//! 协议错误类型定义

/// 监听服务错误
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// IO 错误（绑定、取本地地址）
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 配置解析错误
    #[error("config parse error: {0}")]
    ConfigParse(String),
}
