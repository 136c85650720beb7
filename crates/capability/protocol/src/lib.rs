//! # 报文监听与解码模块
//!
//! 接收设备经 TCP 上报的二进制报文，按设备目录中的点位描述解码为读数并投递。
//!
//! ## 报文格式
//!
//! ```text
//! 0                      22   23
//! ┌──────────────────────┬────┬──────────────────────┐
//! │ 设备名称 (ISO-8859-1) │ key│ 载荷（按点位偏移取值）│
//! └──────────────────────┴────┴──────────────────────┘
//! ```
//!
//! ## 架构设计
//!
//! ```text
//! FrameListener (accept, 连接上限)
//!       │ 每连接一个任务
//!       ▼
//! ConnectionSession ──► DeviceDirectory (名称 → 设备, 设备 → 点位)
//!       │
//!       ▼
//! FrameDecoder ──► KindSelector / decode_field
//!       │
//!       ▼
//! ReadingSink (MQTT / 通道)
//! ```
//!
//! ## 配置格式
//!
//! ```json
//! { "listen_addr": "0.0.0.0:6270", "max_connections": 100, "idle_timeout_secs": 300, "max_frame_size": 1024 }
//! ```

mod codec;
mod decoder;
mod error;
mod session;
mod tcp_server;

pub use codec::{CodecError, decode_field};
pub use decoder::{DeclaredKind, FieldError, FrameDecoder, KindSelector, PointKindOverrides};
pub use error::ProtocolError;
pub use session::{ConnectionSession, FrameOutcome, SessionConfig, SessionError};
pub use tcp_server::{FrameListener, FrameListenerConfig};
