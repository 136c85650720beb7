//! 连接会话
//!
//! 每个连接一个会话，按到达顺序逐条处理报文：一条报文的解码与投递
//! 完成之后才读取下一条。传输层每次读取交付的数据即视为一条完整报文。
//!
//! | 情况 | 处理 |
//! |---|---|
//! | 报文短于头部 | 丢弃，记录诊断，连接保持 |
//! | 设备未注册 | 丢弃，记录诊断，连接保持 |
//! | 投递失败 | 记录诊断，不重试，连接保持 |
//! | 读错误 / 空闲超时 / 目录故障 | 关闭本连接 |

use crate::decoder::FrameDecoder;
use domain::{Frame, hex_dump, now_epoch_ms};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};
use vlisten_directory::{DeviceDirectory, DirectoryError};
use vlisten_sink::{ReadingSink, SinkError};
use vlisten_telemetry::{
    record_backpressure, record_batch_published, record_frame_malformed, record_frame_received,
    record_frame_unknown_device, record_publish_failure, record_readings_decoded,
};

/// 会话级故障，出现后关闭连接。
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("directory error: {0}")]
    Directory(#[from] DirectoryError),
    #[error("idle timeout after {0:?}")]
    IdleTimeout(Duration),
}

/// 单条报文的处理结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// 报文短于头部
    Malformed,
    /// 设备名称未注册
    UnknownDevice,
    /// 没有匹配的点位或全部点位解码失败
    Empty,
    /// 已投递的读数个数
    Published(usize),
    /// 投递失败的读数个数
    SinkFailed(usize),
}

/// 会话参数。
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// 单次读取的最大字节数（即最大报文长度）
    pub max_frame_size: usize,
    /// 空闲超时；`None` 表示不限
    pub idle_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_frame_size: 1024,
            idle_timeout: None,
        }
    }
}

/// 单个连接的会话。
pub struct ConnectionSession {
    peer: String,
    directory: Arc<dyn DeviceDirectory>,
    decoder: FrameDecoder,
    sink: Arc<dyn ReadingSink>,
    config: SessionConfig,
}

impl ConnectionSession {
    pub fn new(
        peer: impl Into<String>,
        directory: Arc<dyn DeviceDirectory>,
        decoder: FrameDecoder,
        sink: Arc<dyn ReadingSink>,
        config: SessionConfig,
    ) -> Self {
        Self {
            peer: peer.into(),
            directory,
            decoder,
            sink,
            config,
        }
    }

    /// 处理一条报文。
    ///
    /// 同一报文的全部读数通过一次 `publish` 投递。
    pub async fn handle_chunk(&self, chunk: &[u8]) -> Result<FrameOutcome, SessionError> {
        record_frame_received();
        debug!(
            target: "vlisten.session",
            peer = %self.peer,
            len = chunk.len(),
            data = %hex_dump(chunk),
            "frame_received"
        );

        let frame = match Frame::parse(chunk, now_epoch_ms()) {
            Ok(frame) => frame,
            Err(err) => {
                record_frame_malformed();
                warn!(target: "vlisten.session", peer = %self.peer, error = %err, "frame_malformed");
                return Ok(FrameOutcome::Malformed);
            }
        };

        let device_name = frame.device_name();
        let Some(device_id) = self.directory.resolve_device_id(&device_name).await? else {
            record_frame_unknown_device();
            info!(
                target: "vlisten.session",
                peer = %self.peer,
                device_name = %device_name,
                "device_unknown"
            );
            return Ok(FrameOutcome::UnknownDevice);
        };

        let readings = self.decoder.decode(&frame, device_id).await?;
        if readings.is_empty() {
            debug!(
                target: "vlisten.session",
                peer = %self.peer,
                device_id,
                key = %frame.key_hex(),
                "frame_without_readings"
            );
            return Ok(FrameOutcome::Empty);
        }

        let count = readings.len();
        record_readings_decoded(count as u64);
        match self.sink.publish(readings).await {
            Ok(()) => {
                record_batch_published();
                debug!(
                    target: "vlisten.session",
                    peer = %self.peer,
                    device_id,
                    readings = count,
                    "readings_published"
                );
                Ok(FrameOutcome::Published(count))
            }
            Err(err) => {
                record_publish_failure();
                if matches!(err, SinkError::Backpressure(_)) {
                    record_backpressure();
                }
                warn!(
                    target: "vlisten.session",
                    peer = %self.peer,
                    device_id,
                    readings = count,
                    error = %err,
                    "readings_publish_failed"
                );
                Ok(FrameOutcome::SinkFailed(count))
            }
        }
    }

    /// 读取并处理报文直到对端关闭或出现会话级故障。
    pub async fn run<R>(&self, mut reader: R) -> Result<(), SessionError>
    where
        R: AsyncRead + Unpin,
    {
        info!(target: "vlisten.session", peer = %self.peer, "session_started");
        let mut buf = vec![0u8; self.config.max_frame_size.max(1)];

        loop {
            let read = match self.config.idle_timeout {
                Some(idle) => tokio::time::timeout(idle, reader.read(&mut buf))
                    .await
                    .map_err(|_| SessionError::IdleTimeout(idle))??,
                None => reader.read(&mut buf).await?,
            };

            if read == 0 {
                info!(target: "vlisten.session", peer = %self.peer, "connection_closed_by_peer");
                return Ok(());
            }

            self.handle_chunk(&buf[..read]).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use domain::{AttributeType, DeviceId, DevicePoints, PointDescriptor, Reading, ValueKind};
    use tokio::io::AsyncWriteExt;
    use tokio::sync::Mutex;
    use vlisten_directory::{DirectorySnapshot, SnapshotDirectory};
    use vlisten_sink::ChannelSink;

    const DEVICE: &str = "ListeningVirtualDevice";

    #[derive(Default)]
    struct RecordingSink {
        batches: Mutex<Vec<Vec<Reading>>>,
    }

    #[async_trait]
    impl ReadingSink for RecordingSink {
        async fn publish(&self, readings: Vec<Reading>) -> Result<(), SinkError> {
            self.batches.lock().await.push(readings);
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl ReadingSink for FailingSink {
        async fn publish(&self, _readings: Vec<Reading>) -> Result<(), SinkError> {
            Err(SinkError::Publish("forced failure".to_string()))
        }
    }

    struct BrokenDirectory;

    #[async_trait]
    impl DeviceDirectory for BrokenDirectory {
        async fn resolve_device_id(&self, _name: &str) -> Result<Option<DeviceId>, DirectoryError> {
            Err(DirectoryError::Backend("offline".to_string()))
        }

        async fn points_of(
            &self,
            _device_id: DeviceId,
        ) -> Result<Option<Arc<DevicePoints>>, DirectoryError> {
            Err(DirectoryError::Backend("offline".to_string()))
        }
    }

    fn directory() -> Arc<dyn DeviceDirectory> {
        let points = [(1, 23), (2, 27)].map(|(id, start)| {
            PointDescriptor::new(id, format!("direction-{}", id))
                .with_kind(ValueKind::Int32)
                .with_attribute("key", AttributeType::Hex, "62")
                .with_attribute("start", AttributeType::Int, start.to_string())
        });
        Arc::new(SnapshotDirectory::new(
            DirectorySnapshot::new().with_device(1, DEVICE, points),
        ))
    }

    fn frame(name: &str, key: u8) -> Vec<u8> {
        let mut bytes = vec![b' '; 22];
        bytes[..name.len()].copy_from_slice(name.as_bytes());
        bytes.push(key);
        bytes.extend_from_slice(&[0, 0, 0, 0x2D, 0, 0, 0, 0x2E]);
        bytes
    }

    fn session(
        directory: Arc<dyn DeviceDirectory>,
        sink: Arc<dyn ReadingSink>,
    ) -> ConnectionSession {
        let decoder = FrameDecoder::new(directory.clone());
        ConnectionSession::new(
            "127.0.0.1:50000",
            directory,
            decoder,
            sink,
            SessionConfig::default(),
        )
    }

    #[tokio::test]
    async fn short_frame_is_malformed() {
        let sink = Arc::new(RecordingSink::default());
        let session = session(directory(), sink.clone());
        let outcome = session.handle_chunk(&[0u8; 22]).await.expect("handled");
        assert_eq!(outcome, FrameOutcome::Malformed);
        assert!(sink.batches.lock().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_device_is_dropped() {
        let sink = Arc::new(RecordingSink::default());
        let session = session(directory(), sink.clone());
        let outcome = session
            .handle_chunk(&frame("SomebodyElse", 0x62))
            .await
            .expect("handled");
        assert_eq!(outcome, FrameOutcome::UnknownDevice);
        assert!(sink.batches.lock().await.is_empty());
    }

    #[tokio::test]
    async fn frame_readings_go_out_as_one_batch() {
        let sink = Arc::new(RecordingSink::default());
        let session = session(directory(), sink.clone());
        let outcome = session
            .handle_chunk(&frame(DEVICE, 0x62))
            .await
            .expect("handled");
        assert_eq!(outcome, FrameOutcome::Published(2));
        let batches = sink.batches.lock().await;
        assert_eq!(batches.len(), 1);
        let values: Vec<_> = batches[0].iter().map(|r| r.value.as_str()).collect();
        assert_eq!(values, vec!["45", "46"]);
    }

    #[tokio::test]
    async fn unmatched_key_skips_sink() {
        let sink = Arc::new(RecordingSink::default());
        let session = session(directory(), sink.clone());
        let outcome = session
            .handle_chunk(&frame(DEVICE, 0x01))
            .await
            .expect("handled");
        assert_eq!(outcome, FrameOutcome::Empty);
        assert!(sink.batches.lock().await.is_empty());
    }

    #[tokio::test]
    async fn sink_failure_keeps_session_alive() {
        let session = session(directory(), Arc::new(FailingSink));
        let outcome = session
            .handle_chunk(&frame(DEVICE, 0x62))
            .await
            .expect("handled");
        assert_eq!(outcome, FrameOutcome::SinkFailed(2));
    }

    #[tokio::test]
    async fn directory_failure_is_connection_fault() {
        let session = session(Arc::new(BrokenDirectory), Arc::new(RecordingSink::default()));
        let err = session
            .handle_chunk(&frame(DEVICE, 0x62))
            .await
            .expect_err("fault");
        assert!(matches!(err, SessionError::Directory(_)));
    }

    #[tokio::test]
    async fn run_processes_frames_in_order_until_eof() {
        let (sink, mut rx) = ChannelSink::new(8);
        let session = session(directory(), Arc::new(sink));
        let (mut client, server) = tokio::io::duplex(256);

        let task = tokio::spawn(async move { session.run(server).await });

        let mut second = frame(DEVICE, 0x62);
        second[25] = 0x01;
        for (chunk, expected) in [(frame(DEVICE, 0x62), "45"), (second, "301")] {
            client.write_all(&chunk).await.expect("write");
            // 每条报文等到被消费后再写，保证一次读取对应一条报文
            let batch = rx.recv().await.expect("batch");
            assert_eq!(batch.len(), 2);
            assert_eq!(batch[0].value, expected);
        }
        drop(client);

        task.await.expect("join").expect("clean close");
    }

    #[tokio::test]
    async fn idle_timeout_closes_session() {
        let decoder = FrameDecoder::new(directory());
        let session = ConnectionSession::new(
            "idle-peer",
            directory(),
            decoder,
            Arc::new(RecordingSink::default()),
            SessionConfig {
                max_frame_size: 64,
                idle_timeout: Some(Duration::from_millis(20)),
            },
        );
        let (_client, server) = tokio::io::duplex(64);
        let err = session.run(server).await.expect_err("timeout");
        assert!(matches!(err, SessionError::IdleTimeout(_)));
    }
}
