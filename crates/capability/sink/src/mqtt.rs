//! MQTT 读数发布
//!
//! 每个批次序列化为 JSON 数组，发布到 `{topic_prefix}/{device_id}`。
//! 请求队列容量由 `capacity` 限定，队列满时立即返回背压。

use crate::{ReadingSink, SinkError};
use async_trait::async_trait;
use domain::Reading;
use rumqttc::{AsyncClient, ClientError, MqttOptions, QoS};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// MQTT 投递配置。
#[derive(Debug, Clone)]
pub struct MqttSinkConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic_prefix: String,
    pub qos: u8,
    /// 请求队列容量（批次数）
    pub capacity: usize,
}

/// MQTT 投递实现（发布读数批次）。
#[derive(Clone)]
pub struct MqttReadingSink {
    client: AsyncClient,
    topic_prefix: String,
    qos: QoS,
    /// 事件循环任务是否仍在运行
    eventloop_alive: Arc<AtomicBool>,
}

/// 事件循环任务退出（含 panic、abort）时清除存活标记。
struct EventLoopGuard(Arc<AtomicBool>);

impl Drop for EventLoopGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl MqttReadingSink {
    /// 创建客户端并在后台驱动事件循环。
    pub fn connect(config: MqttSinkConfig) -> (Self, tokio::task::JoinHandle<()>) {
        let client_id = format!("vlisten-sink-{}", uuid::Uuid::new_v4());
        let mut options = MqttOptions::new(client_id, config.host, config.port);
        options.set_keep_alive(Duration::from_secs(30));
        if let (Some(username), Some(password)) = (config.username, config.password) {
            options.set_credentials(username, password);
        }
        let (client, mut eventloop) = AsyncClient::new(options, config.capacity.max(1));
        let eventloop_alive = Arc::new(AtomicBool::new(true));
        let guard = EventLoopGuard(Arc::clone(&eventloop_alive));
        let handle = tokio::spawn(async move {
            let _guard = guard;
            loop {
                if let Err(err) = eventloop.poll().await {
                    warn!(target: "vlisten.sink", "mqtt sink eventloop error: {}", err);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        });
        (
            Self::from_client(client, config.topic_prefix, config.qos, eventloop_alive),
            handle,
        )
    }

    fn from_client(
        client: AsyncClient,
        topic_prefix: String,
        qos: u8,
        eventloop_alive: Arc<AtomicBool>,
    ) -> Self {
        Self {
            client,
            topic_prefix,
            qos: qos_from_u8(qos),
            eventloop_alive,
        }
    }

    fn topic_for(&self, device_id: u64) -> String {
        format!("{}/{}", self.topic_prefix.trim_end_matches('/'), device_id)
    }
}

#[async_trait]
impl ReadingSink for MqttReadingSink {
    async fn publish(&self, readings: Vec<Reading>) -> Result<(), SinkError> {
        let Some(first) = readings.first() else {
            return Ok(());
        };
        // 请求队列满与事件循环退出都表现为 TryRequest，先按存活标记区分
        if !self.eventloop_alive.load(Ordering::Acquire) {
            return Err(SinkError::Closed);
        }
        let topic = self.topic_for(first.device_id);
        let payload =
            serde_json::to_vec(&readings).map_err(|err| SinkError::Payload(err.to_string()))?;
        debug!(
            target: "vlisten.sink",
            topic = %topic,
            readings = readings.len(),
            payload_size = payload.len(),
            "mqtt_publish"
        );
        self.client
            .try_publish(topic, self.qos, false, payload)
            .map_err(|err| match err {
                ClientError::TryRequest(_) => {
                    SinkError::Backpressure("mqtt request queue full".to_string())
                }
                other => SinkError::Publish(other.to_string()),
            })
    }
}

fn qos_from_u8(value: u8) -> QoS {
    match value {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}
