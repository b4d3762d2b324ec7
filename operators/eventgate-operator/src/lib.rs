//! EventGate Operator - 协调 Gateway 自定义资源
//!
//! 根据 Gateway 的期望规范创建转换器 ConfigMap、网关 Deployment 与可选的 Service，
//! 并把网关状态收敛到 New、Running、Error 三种之一。

pub mod client;
pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod reconcile;
pub mod resources;
pub mod retry;
pub mod validate;

pub use error::{Error, Result};

use kube::Client;

/// Operator 主结构体
pub struct EventGateOperator {
    /// 控制器
    controller: controller::Controller,
}

impl EventGateOperator {
    /// 创建新的 Operator 实例
    pub async fn new(config: config::ControllerConfig) -> Result<Self> {
        // 创建 Kubernetes 客户端
        let client = Client::try_default().await?;

        Ok(Self {
            controller: controller::Controller::new(client, config),
        })
    }

    /// 运行 Operator，直到收到退出信号
    pub async fn run(&self) -> Result<()> {
        self.controller.run().await
    }
}
