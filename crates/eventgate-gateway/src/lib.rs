//! EventGate Gateway - 网关工作负载运行时
//!
//! 网关 Pod 中运行两个进程：处理器根据网关 ConfigMap 在共享 HTTP 服务器上
//! 注册 Webhook 路由，并把收到的负载派发给转换器；转换器监听转换器
//! ConfigMap，把负载包装成事件后投递给传感器。

pub mod config;
pub mod config_watcher;
pub mod configurations;
pub mod dispatch;
pub mod metrics;
pub mod server;
pub mod transform;
pub mod webhook;

use kube::Client;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use eventgate_common::Result;

use crate::config::RuntimeConfig;
use crate::config_watcher::{ConfigStore, TransformerConfigWatcher};
use crate::configurations::ConfigurationManager;
use crate::dispatch::HttpDispatcher;
use crate::metrics::GatewayMetrics;
use crate::transform::Transformer;
use crate::webhook::RouteTable;

/// 运行中的后台监听
struct Watch {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl Watch {
    async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.handle.await {
            warn!("监听任务异常退出: {}", e);
        }
    }
}

/// Webhook 网关处理器
pub struct WebhookGateway {
    config: RuntimeConfig,
    metrics: Arc<GatewayMetrics>,
    routes: Arc<RouteTable>,
    configurations: Arc<ConfigurationManager>,
    watch: Option<Watch>,
}

impl WebhookGateway {
    /// 创建处理器，负载派发到本 Pod 的转换器
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        let metrics = Arc::new(GatewayMetrics::new()?);
        let dispatcher = Arc::new(HttpDispatcher::for_transformer(config.transformer_port)?);
        let routes = Arc::new(RouteTable::new(dispatcher, metrics.clone()));
        let configurations = Arc::new(ConfigurationManager::new(routes.clone(), metrics.clone()));

        Ok(Self {
            config,
            metrics,
            routes,
            configurations,
            watch: None,
        })
    }

    /// 启动指标端点并开始监听网关 ConfigMap
    pub fn start(&mut self, client: Client) -> Result<()> {
        let name = self.config.require_gateway_config_map()?.to_string();
        self.metrics.start_metrics_server(self.config.metrics_addr())?;
        if let Some(addr) = self.config.server_addr() {
            self.routes.start(addr)?;
        }

        let (shutdown, stopped) = oneshot::channel();
        let handle = self
            .configurations
            .watch(client, &self.config.namespace, &name, stopped);
        self.watch = Some(Watch { shutdown, handle });

        info!("Webhook 网关已启动，配置来源: {}/{}", self.config.namespace, name);
        Ok(())
    }

    /// 停止监听并停止全部配置
    pub async fn stop(&mut self) {
        if let Some(watch) = self.watch.take() {
            watch.stop().await;
        }
        self.configurations.shutdown().await;
        info!("Webhook 网关已停止");
    }

    pub fn routes(&self) -> Arc<RouteTable> {
        self.routes.clone()
    }
}

/// 转换器进程
pub struct TransformerRuntime {
    config: RuntimeConfig,
    metrics: Arc<GatewayMetrics>,
    store: ConfigStore,
    transformer: Arc<Transformer>,
    watch: Option<Watch>,
}

impl TransformerRuntime {
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        let metrics = Arc::new(GatewayMetrics::new()?);
        let store = ConfigStore::new();
        let transformer = Arc::new(Transformer::new(
            store.clone(),
            &config.namespace,
            metrics.clone(),
        ));

        Ok(Self {
            config,
            metrics,
            store,
            transformer,
            watch: None,
        })
    }

    /// 开始监听转换器 ConfigMap 并启动转换器服务器
    pub fn start(&mut self, client: Client) -> Result<()> {
        let name = self.config.require_transformer_config_map()?.to_string();
        let watcher = TransformerConfigWatcher::new(
            client,
            &self.config.namespace,
            self.store.clone(),
            self.metrics.clone(),
        );

        let (shutdown, stopped) = oneshot::channel();
        let handle = watcher.watch(&name, stopped);
        self.watch = Some(Watch { shutdown, handle });

        self.transformer.start(self.config.transformer_addr())?;
        self.metrics
            .start_metrics_server(self.config.transformer_metrics_addr())?;
        info!("转换器已启动，配置来源: {}/{}", self.config.namespace, name);
        Ok(())
    }

    pub async fn stop(&mut self) {
        if let Some(watch) = self.watch.take() {
            watch.stop().await;
        }
        info!("转换器已停止");
    }
}
