//! 日志初始化与驱动计数指标。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 指标快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub connections_rejected: u64,
    pub frames_received: u64,
    pub frames_malformed: u64,
    pub frames_unknown_device: u64,
    pub readings_decoded: u64,
    pub points_skipped: u64,
    pub batches_published: u64,
    pub publish_failures: u64,
    pub backpressure: u64,
}

/// 驱动计数指标。
pub struct TelemetryMetrics {
    connections_opened: AtomicU64,
    connections_closed: AtomicU64,
    connections_rejected: AtomicU64,
    frames_received: AtomicU64,
    frames_malformed: AtomicU64,
    frames_unknown_device: AtomicU64,
    readings_decoded: AtomicU64,
    points_skipped: AtomicU64,
    batches_published: AtomicU64,
    publish_failures: AtomicU64,
    backpressure: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            connections_opened: AtomicU64::new(0),
            connections_closed: AtomicU64::new(0),
            connections_rejected: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            frames_malformed: AtomicU64::new(0),
            frames_unknown_device: AtomicU64::new(0),
            readings_decoded: AtomicU64::new(0),
            points_skipped: AtomicU64::new(0),
            batches_published: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            backpressure: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_malformed: self.frames_malformed.load(Ordering::Relaxed),
            frames_unknown_device: self.frames_unknown_device.load(Ordering::Relaxed),
            readings_decoded: self.readings_decoded.load(Ordering::Relaxed),
            points_skipped: self.points_skipped.load(Ordering::Relaxed),
            batches_published: self.batches_published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            backpressure: self.backpressure.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

pub fn record_connection_opened() {
    metrics().connections_opened.fetch_add(1, Ordering::Relaxed);
}

pub fn record_connection_closed() {
    metrics().connections_closed.fetch_add(1, Ordering::Relaxed);
}

/// 记录因连接数上限被拒绝的连接。
pub fn record_connection_rejected() {
    metrics()
        .connections_rejected
        .fetch_add(1, Ordering::Relaxed);
}

pub fn record_frame_received() {
    metrics().frames_received.fetch_add(1, Ordering::Relaxed);
}

/// 记录头部不完整的报文。
pub fn record_frame_malformed() {
    metrics().frames_malformed.fetch_add(1, Ordering::Relaxed);
}

/// 记录未注册设备的报文。
pub fn record_frame_unknown_device() {
    metrics()
        .frames_unknown_device
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录解码出的读数个数。
pub fn record_readings_decoded(count: u64) {
    metrics()
        .readings_decoded
        .fetch_add(count, Ordering::Relaxed);
}

/// 记录解码失败被跳过的点位。
pub fn record_point_skipped() {
    metrics().points_skipped.fetch_add(1, Ordering::Relaxed);
}

pub fn record_batch_published() {
    metrics().batches_published.fetch_add(1, Ordering::Relaxed);
}

pub fn record_publish_failure() {
    metrics().publish_failures.fetch_add(1, Ordering::Relaxed);
}

pub fn record_backpressure() {
    metrics().backpressure.fetch_add(1, Ordering::Relaxed);
}
