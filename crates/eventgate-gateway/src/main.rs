use anyhow::{Context, Result};
use clap::Parser;
use kube::Client;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use eventgate_gateway::config::RuntimeConfig;
use eventgate_gateway::WebhookGateway;

/// EventGate Webhook 网关处理器
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// 可选的 YAML 配置文件，环境变量优先
    #[arg(long, env = "EVENTGATE_RUNTIME_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = RuntimeConfig::load(args.config.as_deref()).context("加载运行时配置失败")?;
    let client = Client::try_default()
        .await
        .context("创建 Kubernetes 客户端失败")?;

    let mut gateway = WebhookGateway::new(config)?;
    gateway.start(client)?;

    tokio::signal::ctrl_c().await?;
    info!("收到退出信号");
    gateway.stop().await;

    Ok(())
}
