//! # 读数投递
//!
//! 解码链路把同一报文得到的全部读数作为一个批次交给 [`ReadingSink`]。
//! 投递是“至多一次”语义：失败由调用方记录，不在解码侧重试。
//!
//! 实现：
//! - [`MqttReadingSink`]：发布到 MQTT，有界请求队列，满时返回背压
//! - [`ChannelSink`]：有界 tokio 通道，供进程内消费与测试
//! - [`NoopSink`]：丢弃（未配置下游时使用）

mod channel;
mod mqtt;

pub use channel::ChannelSink;
pub use mqtt::{MqttReadingSink, MqttSinkConfig};

use async_trait::async_trait;
use domain::Reading;

/// 投递错误。
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("backpressure: {0}")]
    Backpressure(String),
    #[error("sink closed")]
    Closed,
    #[error("publish error: {0}")]
    Publish(String),
    #[error("payload error: {0}")]
    Payload(String),
}

/// 读数投递抽象。
///
/// 必须可被多个连接并发调用，且不能无限期阻塞调用方。
#[async_trait]
pub trait ReadingSink: Send + Sync {
    async fn publish(&self, readings: Vec<Reading>) -> Result<(), SinkError>;
}

/// 空投递器（用于接线与测试）。
#[derive(Debug, Default)]
pub struct NoopSink;

#[async_trait]
impl ReadingSink for NoopSink {
    async fn publish(&self, _readings: Vec<Reading>) -> Result<(), SinkError> {
        Ok(())
    }
}
