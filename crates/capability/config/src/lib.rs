//! 驱动运行配置加载。

use std::env;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 读数投递方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Mqtt,
    Noop,
}

impl SinkKind {
    fn parse(key: &str, value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mqtt" => Ok(Self::Mqtt),
            "noop" | "off" | "" => Ok(Self::Noop),
            _ => Err(ConfigError::Invalid(key.to_string(), value.to_string())),
        }
    }
}

/// 驱动运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: String,
    pub max_connections: usize,
    pub idle_timeout_secs: u64,
    pub max_frame_size: usize,
    pub directory_file: String,
    pub directory_reload_secs: Option<u64>,
    pub sink: SinkKind,
    pub sink_capacity: usize,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_topic_prefix: String,
    pub mqtt_qos: u8,
    pub metrics_log_secs: u64,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let directory_file = env::var("VLISTEN_DIRECTORY_FILE")
            .map_err(|_| ConfigError::Missing("VLISTEN_DIRECTORY_FILE".to_string()))?;
        let listen_addr =
            env::var("VLISTEN_LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:6270".to_string());
        let max_connections = read_usize_with_default("VLISTEN_MAX_CONNECTIONS", 100)?;
        let idle_timeout_secs = read_u64_with_default("VLISTEN_IDLE_TIMEOUT_SECONDS", 300)?;
        let max_frame_size = read_usize_with_default("VLISTEN_MAX_FRAME_SIZE", 1024)?;
        let directory_reload_secs =
            read_optional_u64("VLISTEN_DIRECTORY_RELOAD_SECONDS")?.filter(|value| *value > 0);
        let sink = match env::var("VLISTEN_SINK") {
            Ok(value) => SinkKind::parse("VLISTEN_SINK", &value)?,
            Err(_) => SinkKind::Noop,
        };
        let sink_capacity = read_usize_with_default("VLISTEN_SINK_CAPACITY", 64)?;
        let mqtt_host = env::var("VLISTEN_MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let mqtt_port = read_u16_with_default("VLISTEN_MQTT_PORT", 1883)?;
        let mqtt_username = read_optional("VLISTEN_MQTT_USERNAME");
        let mqtt_password = read_optional("VLISTEN_MQTT_PASSWORD");
        let mqtt_topic_prefix = env::var("VLISTEN_MQTT_TOPIC_PREFIX")
            .unwrap_or_else(|_| "vlisten/readings".to_string());
        let mqtt_qos = read_u8_with_default("VLISTEN_MQTT_QOS", 1)?;
        let metrics_log_secs = read_u64_with_default("VLISTEN_METRICS_LOG_SECONDS", 60)?;

        if max_frame_size == 0 {
            return Err(ConfigError::Invalid(
                "VLISTEN_MAX_FRAME_SIZE".to_string(),
                "0".to_string(),
            ));
        }
        if sink_capacity == 0 {
            return Err(ConfigError::Invalid(
                "VLISTEN_SINK_CAPACITY".to_string(),
                "0".to_string(),
            ));
        }

        Ok(Self {
            listen_addr,
            max_connections,
            idle_timeout_secs,
            max_frame_size,
            directory_file,
            directory_reload_secs,
            sink,
            sink_capacity,
            mqtt_host,
            mqtt_port,
            mqtt_username,
            mqtt_password,
            mqtt_topic_prefix,
            mqtt_qos,
            metrics_log_secs,
        })
    }
}

fn read_u16_with_default(key: &str, default: u16) -> Result<u16, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u16>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u8_with_default(key: &str, default: u8) -> Result<u8, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u8>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_usize_with_default(key: &str, default: usize) -> Result<usize, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<usize>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_optional_u64(key: &str) -> Result<Option<u64>, ConfigError> {
    match env::var(key) {
        Ok(value) if value.is_empty() => Ok(None),
        Ok(value) => value
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(key.to_string(), value)),
        Err(_) => Ok(None),
    }
}
