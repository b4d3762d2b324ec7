use anyhow::{Context, Result};
use clap::Parser;
use kube::CustomResourceExt;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use eventgate_operator::config::ControllerConfig;
use eventgate_operator::crd::Gateway;
use eventgate_operator::EventGateOperator;

/// EventGate Gateway Operator
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// YAML 配置文件路径
    #[arg(long, env = "EVENTGATE_CONFIG")]
    config: Option<PathBuf>,

    /// 只协调该命名空间中的网关
    #[arg(long, env = "EVENTGATE_NAMESPACE")]
    namespace: Option<String>,

    /// 输出 Gateway CRD 后退出
    #[arg(long)]
    print_crd: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    if args.print_crd {
        print!("{}", serde_yaml::to_string(&Gateway::crd())?);
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => ControllerConfig::load(path).context("加载 Operator 配置失败")?,
        None => ControllerConfig::default(),
    };
    if args.namespace.is_some() {
        config.namespace = args.namespace;
    }

    info!("启动 EventGate Operator");
    let operator = EventGateOperator::new(config)
        .await
        .context("创建 Kubernetes 客户端失败")?;
    operator.run().await?;

    Ok(())
}
