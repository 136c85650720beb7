//! 监听链路装配模块
//!
//! 将设备目录、读数投递、解码器与 TCP 监听服务组装在一起，
//! 并启动目录重载、指标输出等后台任务。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use vlisten_config::{AppConfig, SinkKind};
use vlisten_directory::{DirectoryError, SnapshotDirectory, load_snapshot_file, spawn_reload};
use vlisten_protocol::{FrameDecoder, FrameListener, FrameListenerConfig};
use vlisten_sink::{MqttReadingSink, MqttSinkConfig, NoopSink, ReadingSink};
use vlisten_telemetry::metrics;

/// 加载目录文件并按配置启动周期重载。
pub fn build_directory(config: &AppConfig) -> Result<Arc<SnapshotDirectory>, DirectoryError> {
    let snapshot = load_snapshot_file(&config.directory_file)?;
    info!(
        target: "vlisten.directory",
        path = %config.directory_file,
        devices = snapshot.device_count(),
        points = snapshot.point_count(),
        "directory_loaded"
    );
    let directory = Arc::new(SnapshotDirectory::new(snapshot));

    if let Some(secs) = config.directory_reload_secs {
        info!(target: "vlisten.directory", interval_secs = secs, "directory_reload_enabled");
        spawn_reload(
            Arc::clone(&directory),
            PathBuf::from(&config.directory_file),
            Duration::from_secs(secs),
        );
    }
    Ok(directory)
}

/// 根据配置选择投递方式：MQTT 或空操作。
pub fn build_sink(config: &AppConfig) -> Arc<dyn ReadingSink> {
    match config.sink {
        SinkKind::Mqtt => {
            let mqtt_config = MqttSinkConfig {
                host: config.mqtt_host.clone(),
                port: config.mqtt_port,
                username: config.mqtt_username.clone(),
                password: config.mqtt_password.clone(),
                topic_prefix: config.mqtt_topic_prefix.clone(),
                qos: config.mqtt_qos,
                capacity: config.sink_capacity,
            };
            info!(
                "reading sink: mqtt {}:{} prefix={}",
                mqtt_config.host, mqtt_config.port, mqtt_config.topic_prefix
            );
            // 事件循环任务随进程存活
            let (sink, _eventloop) = MqttReadingSink::connect(mqtt_config);
            Arc::new(sink)
        }
        SinkKind::Noop => {
            info!("reading sink: noop (VLISTEN_SINK=noop)");
            Arc::new(NoopSink)
        }
    }
}

/// 组装监听服务。
pub fn build_listener(
    config: &AppConfig,
    directory: Arc<SnapshotDirectory>,
    sink: Arc<dyn ReadingSink>,
) -> FrameListener {
    let listener_config = FrameListenerConfig {
        listen_addr: config.listen_addr.clone(),
        max_connections: config.max_connections,
        idle_timeout_secs: config.idle_timeout_secs,
        max_frame_size: config.max_frame_size,
    };
    let decoder = FrameDecoder::new(directory.clone());
    FrameListener::new(listener_config, directory, decoder, sink)
}

/// 周期输出计数指标快照；间隔为 0 时不启动。
pub fn spawn_metrics_log(interval_secs: u64) -> Option<tokio::task::JoinHandle<()>> {
    if interval_secs == 0 {
        return None;
    }
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let snapshot = metrics().snapshot();
            info!(
                target: "vlisten.metrics",
                connections_opened = snapshot.connections_opened,
                connections_closed = snapshot.connections_closed,
                connections_rejected = snapshot.connections_rejected,
                frames_received = snapshot.frames_received,
                frames_malformed = snapshot.frames_malformed,
                frames_unknown_device = snapshot.frames_unknown_device,
                readings_decoded = snapshot.readings_decoded,
                points_skipped = snapshot.points_skipped,
                batches_published = snapshot.batches_published,
                publish_failures = snapshot.publish_failures,
                backpressure = snapshot.backpressure,
                "metrics_snapshot"
            );
        }
    }))
}
