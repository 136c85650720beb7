use crate::{ReadingSink, SinkError};
use async_trait::async_trait;
use domain::Reading;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// 有界通道投递器。
///
/// 每个批次占用一个通道槽位；通道满时立即返回背压而不是等待。
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Vec<Reading>>,
}

impl ChannelSink {
    /// 创建投递器与对应的接收端。
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Vec<Reading>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ReadingSink for ChannelSink {
    async fn publish(&self, readings: Vec<Reading>) -> Result<(), SinkError> {
        match self.tx.try_send(readings) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SinkError::Backpressure("channel full".to_string())),
            Err(TrySendError::Closed(_)) => Err(SinkError::Closed),
        }
    }
}
