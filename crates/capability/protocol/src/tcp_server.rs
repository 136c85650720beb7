//! TCP 监听服务
//!
//! 监听 TCP 端口，每个接入连接启动一个独立任务运行 [`ConnectionSession`]。
//! 单个连接的故障（读错误、超时、目录故障甚至 panic）只影响该连接本身。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let config = FrameListenerConfig::from_json(r#"{"listen_addr": "0.0.0.0:6270"}"#)?;
//! let listener = FrameListener::new(config, directory, decoder, sink);
//! listener.run_until(tokio::signal::ctrl_c()).await?;
//! ```

use crate::decoder::FrameDecoder;
use crate::error::ProtocolError;
use crate::session::{ConnectionSession, SessionConfig, SessionError};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use vlisten_directory::DeviceDirectory;
use vlisten_sink::ReadingSink;
use vlisten_telemetry::{
    record_connection_closed, record_connection_opened, record_connection_rejected,
};

/// 接受连接失败后的重试间隔
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// 监听服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameListenerConfig {
    /// 监听地址
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// 最大连接数
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// 连接空闲超时（秒），0 表示不限
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// 单条报文最大长度
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
}

fn default_listen_addr() -> String {
    "0.0.0.0:6270".to_string()
}

fn default_max_connections() -> usize {
    100
}

fn default_idle_timeout() -> u64 {
    300
}

fn default_max_frame_size() -> usize {
    1024
}

impl Default for FrameListenerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_connections: default_max_connections(),
            idle_timeout_secs: default_idle_timeout(),
            max_frame_size: default_max_frame_size(),
        }
    }
}

impl FrameListenerConfig {
    /// 从 JSON 配置字符串解析
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(json).map_err(|e| ProtocolError::ConfigParse(e.to_string()))
    }

    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            max_frame_size: self.max_frame_size,
            idle_timeout: (self.idle_timeout_secs > 0)
                .then(|| Duration::from_secs(self.idle_timeout_secs)),
        }
    }
}

/// 报文监听服务
pub struct FrameListener {
    config: FrameListenerConfig,
    directory: Arc<dyn DeviceDirectory>,
    decoder: FrameDecoder,
    sink: Arc<dyn ReadingSink>,
}

impl FrameListener {
    pub fn new(
        config: FrameListenerConfig,
        directory: Arc<dyn DeviceDirectory>,
        decoder: FrameDecoder,
        sink: Arc<dyn ReadingSink>,
    ) -> Self {
        Self {
            config,
            directory,
            decoder,
            sink,
        }
    }

    /// 绑定地址并持续运行
    pub async fn run(&self) -> Result<(), ProtocolError> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// 绑定地址并运行，直到 `shutdown` 完成
    pub async fn run_until<F>(&self, shutdown: F) -> Result<(), ProtocolError>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// 在已绑定的监听器上接受连接，直到 `shutdown` 完成
    ///
    /// 停止接受后已建立的连接继续运行到各自结束。
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<(), ProtocolError>
    where
        F: Future<Output = ()>,
    {
        let local_addr = listener.local_addr()?;
        info!(
            target: "vlisten.listener",
            addr = %local_addr,
            max_connections = self.config.max_connections,
            "listener_started"
        );

        let permits = Arc::new(Semaphore::new(self.config.max_connections.max(1)));
        let session_config = self.config.session_config();
        tokio::pin!(shutdown);

        loop {
            let accepted = tokio::select! {
                _ = &mut shutdown => {
                    info!(target: "vlisten.listener", addr = %local_addr, "listener_stopped");
                    return Ok(());
                }
                accepted = listener.accept() => accepted,
            };

            let (stream, peer_addr) = match accepted {
                Ok(accepted) => accepted,
                Err(err) => {
                    error!(target: "vlisten.listener", error = %err, "accept_failed");
                    // 文件描述符耗尽等情况下避免空转
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    continue;
                }
            };

            let Ok(permit) = Arc::clone(&permits).try_acquire_owned() else {
                record_connection_rejected();
                warn!(
                    target: "vlisten.listener",
                    peer = %peer_addr,
                    max_connections = self.config.max_connections,
                    "connection_rejected"
                );
                drop(stream);
                continue;
            };

            record_connection_opened();
            info!(target: "vlisten.listener", peer = %peer_addr, "connection_opened");

            let session = ConnectionSession::new(
                peer_addr.to_string(),
                Arc::clone(&self.directory),
                self.decoder.clone(),
                Arc::clone(&self.sink),
                session_config.clone(),
            );

            tokio::spawn(async move {
                let _permit = permit;
                match session.run(stream).await {
                    Ok(()) => {}
                    Err(SessionError::IdleTimeout(idle)) => {
                        info!(
                            target: "vlisten.listener",
                            peer = %peer_addr,
                            idle_secs = idle.as_secs(),
                            "connection_idle_timeout"
                        );
                    }
                    Err(err) => {
                        warn!(
                            target: "vlisten.listener",
                            peer = %peer_addr,
                            error = %err,
                            "connection_fault"
                        );
                    }
                }
                record_connection_closed();
                info!(target: "vlisten.listener", peer = %peer_addr, "connection_closed");
            });
        }
    }
}
