//! # 设备目录
//!
//! 为解码链路提供只读的设备/点位元数据：
//!
//! - 设备名称 → 设备 ID
//! - 设备 ID → 点位描述（属性表 + 值类型）
//!
//! ## 架构设计
//!
//! ```text
//! directory.json ──load──▶ DirectorySnapshot ──swap──▶ SnapshotDirectory
//!                                                          │
//!                                 ConnectionSession ◀──────┘ (DeviceDirectory)
//! ```
//!
//! 快照不可变，读取方只持有 `Arc`；重载或增量更新时构造新快照并原子替换，
//! 已在解码中的报文继续使用旧快照。

mod error;
mod loader;
mod snapshot;
mod traits;

pub use error::DirectoryError;
pub use loader::{DeviceEntry, DirectoryDocument, load_snapshot_file, spawn_reload};
pub use snapshot::{DirectorySnapshot, SnapshotDirectory};
pub use traits::DeviceDirectory;
