//! 控制器模块
//!
//! kube-rs 的 Controller 充当工作队列：同一网关同一时间只有一个协调在执行，
//! 不同网关之间并发协调。网关拥有的 Deployment 发生变化时会重新入队其所属网关。

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use kube::{
    api::Api,
    client::Client,
    runtime::{
        controller::{Action, Controller as KubeController},
        watcher,
    },
};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::client::KubeResourceClient;
use crate::config::ControllerConfig;
use crate::crd::Gateway;
use crate::error::{Error, Result};
use crate::reconcile::Reconciler;

/// 控制器结构体
pub struct Controller {
    /// Kubernetes 客户端
    client: Client,
    /// 协调器
    reconciler: Arc<Reconciler>,
    /// Operator 配置
    config: ControllerConfig,
}

async fn reconcile(gateway: Arc<Gateway>, reconciler: Arc<Reconciler>) -> Result<Action> {
    reconciler.reconcile(gateway).await
}

fn error_policy(gateway: Arc<Gateway>, error: &Error, reconciler: Arc<Reconciler>) -> Action {
    reconciler.handle_error(gateway, error)
}

impl Controller {
    /// 创建新的控制器
    pub fn new(client: Client, config: ControllerConfig) -> Self {
        let reconciler = Arc::new(Reconciler::new(
            Arc::new(KubeResourceClient::new(client.clone())),
            config.clone(),
        ));

        Self {
            client,
            reconciler,
            config,
        }
    }

    fn api<K>(&self) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        match &self.config.namespace {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        }
    }

    /// 运行控制器直到收到退出信号
    pub async fn run(&self) -> Result<()> {
        let gateways: Api<Gateway> = self.api();
        let deployments: Api<Deployment> = self.api();

        info!(
            "启动 Gateway 控制器，命名空间: {}",
            self.config.namespace.as_deref().unwrap_or("全部")
        );

        KubeController::new(gateways, watcher::Config::default())
            .owns(deployments, watcher::Config::default())
            .shutdown_on_signal()
            .run(reconcile, error_policy, self.reconciler.clone())
            .for_each(|result| async move {
                match result {
                    Ok((gateway, _)) => debug!("协调成功: {}", gateway),
                    Err(e) => error!("协调错误: {}", e),
                }
            })
            .await;

        info!("Gateway 控制器已停止");
        Ok(())
    }

    /// 获取协调器
    pub fn get_reconciler(&self) -> Arc<Reconciler> {
        self.reconciler.clone()
    }
}
