//! 监听型遥测驱动：接收设备 TCP 报文，解码为读数并投递。

mod wiring;

use tracing::info;
use vlisten_config::AppConfig;
use vlisten_telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 从环境变量加载运行配置
    let config = AppConfig::from_env()?;
    // 初始化结构化日志
    init_tracing();

    // 设备目录（启动时必须加载成功）
    let directory = wiring::build_directory(&config)?;
    // 读数投递
    let sink = wiring::build_sink(&config);
    // 监听服务
    let listener = wiring::build_listener(&config, directory, sink);
    wiring::spawn_metrics_log(config.metrics_log_secs);

    listener
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;
    Ok(())
}
