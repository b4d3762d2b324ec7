//! 资源协调模块
//!
//! 每次从队列取出一个网关，对其深拷贝执行一次状态迁移：
//!
//! - `New`：创建转换器 ConfigMap 与 Deployment，按需创建 Service，写入 `Running` 或 `Error`
//! - `Error`：把 Deployment 中处理器容器的镜像更新为期望镜像，写入 `Running`
//! - `Running`：不做任何操作
//!
//! 协调只做创建或单字段修改，从不删除资源。

use chrono::{DateTime, Utc};
use kube::runtime::controller::Action;
use kube::ResourceExt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, info_span, warn, Instrument};

use eventgate_common::deployment_name;

use crate::client::ResourceClient;
use crate::config::ControllerConfig;
use crate::crd::{Gateway, GatewayPhase};
use crate::error::{Error, Result};
use crate::resources;
use crate::retry;
use crate::validate::validate;

/// 单个网关的一次协调操作
///
/// 持有网关的独立副本，执行过程中的修改不会影响共享缓存。
pub struct GatewayOperation<'a> {
    /// 网关副本
    gateway: Gateway,
    /// 远程资源客户端
    client: &'a dyn ResourceClient,
    /// Operator 配置
    config: &'a ControllerConfig,
}

/// 创建已存在的资源视为成功
fn tolerate_existing<T>(result: Result<T>) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if e.is_already_exists() => {
            debug!("资源已存在，跳过创建");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

impl<'a> GatewayOperation<'a> {
    /// 创建新的协调操作
    pub fn new(
        gateway: &Gateway,
        client: &'a dyn ResourceClient,
        config: &'a ControllerConfig,
    ) -> Self {
        Self {
            gateway: gateway.clone(),
            client,
            config,
        }
    }

    /// 当前的网关副本
    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// 校验网关并执行一次状态迁移
    pub async fn operate(&mut self) -> Result<()> {
        info!("开始处理网关");

        if let Err(e) = validate(&self.gateway) {
            error!("网关校验失败: {}", e);
            return Err(e);
        }

        match self.gateway.phase() {
            GatewayPhase::New => self.provision().await,
            GatewayPhase::Error => self.repair().await,
            GatewayPhase::Running => {
                // TODO: 传感器列表变化时同步更新转换器 ConfigMap
                warn!("网关已在运行");
                Ok(())
            }
        }
    }

    /// 为新网关创建资源
    async fn provision(&mut self) -> Result<()> {
        if let Some(deploy_spec) = self.gateway.spec.deploy_spec.as_mut() {
            if deploy_spec.image_pull_policy.is_none() {
                deploy_spec.image_pull_policy = Some(resources::PULL_ALWAYS.to_string());
            }
        }

        let config_map = resources::transformer_config_map(&self.gateway)?;
        let deployment = resources::gateway_deployment(&self.gateway, self.config)?;

        let mut phase = GatewayPhase::Running;

        if let Err(e) = tolerate_existing(self.client.create_config_map(&config_map).await) {
            error!("创建转换器配置失败: {}", e);
            phase = GatewayPhase::Error;
        }

        if let Err(e) = tolerate_existing(self.client.create_deployment(&deployment).await) {
            error!("创建网关 Deployment 失败: {}", e);
            phase = GatewayPhase::Error;
        }

        self.gateway.status = Some(phase);

        if phase == GatewayPhase::Running && self.gateway.spec.service.port != 0 {
            self.create_service().await;
        }

        self.persist_status().await
    }

    /// 修复处于错误状态的网关
    ///
    /// Deployment 的读取和更新失败直接返回，不经过重试。
    async fn repair(&mut self) -> Result<()> {
        let namespace = self.namespace();
        let name = deployment_name(&self.gateway.name_any());

        let mut deployment = self
            .client
            .get_deployment(&namespace, &name)
            .await
            .map_err(|e| {
                error!("读取网关 Deployment 失败: {}", e);
                e
            })?;

        let image = self
            .gateway
            .spec
            .deploy_spec
            .as_ref()
            .map(|spec| spec.image.clone())
            .unwrap_or_default();
        resources::patch_processor_image(&mut deployment, &image)?;

        self.client
            .update_deployment(&deployment)
            .await
            .map_err(|e| {
                error!("更新网关 Deployment 失败: {}", e);
                e
            })?;

        info!("处理器镜像已更新为 {}", image);
        self.gateway.status = Some(GatewayPhase::Running);
        self.persist_status().await
    }

    /// 创建 Service，失败只记录日志
    async fn create_service(&self) {
        let service = match resources::gateway_service(&self.gateway) {
            Ok(service) => service,
            Err(e) => {
                error!("构造网关 Service 失败: {}", e);
                return;
            }
        };

        match tolerate_existing(self.client.create_service(&service).await) {
            Ok(()) => info!("已创建网关 Service，端口 {}", self.gateway.spec.service.port),
            Err(e) => error!("创建网关 Service 失败: {}", e),
        }
    }

    /// 写入网关状态，首次失败后交给重试流程
    async fn persist_status(&mut self) -> Result<()> {
        let phase = self.gateway.phase();

        match self.client.update_gateway_status(&self.gateway).await {
            Ok(updated) => self.gateway = updated,
            Err(e) => {
                warn!("更新网关状态失败，开始重试: {}", e);
                let namespace = self.namespace();
                let name = self.gateway.name_any();
                self.gateway =
                    retry::reapply_update(self.client, &namespace, &name, phase, &self.config.retry)
                        .await
                        .map_err(|e| {
                            error!("更新网关状态失败: {}", e);
                            e
                        })?;
            }
        }

        info!("网关状态已更新为 {}", phase);
        Ok(())
    }

    fn namespace(&self) -> String {
        self.gateway.namespace().unwrap_or_else(|| "default".into())
    }
}

/// 协调器结构体
pub struct Reconciler {
    /// 远程资源客户端
    client: Arc<dyn ResourceClient>,
    /// Operator 配置
    config: ControllerConfig,
    /// 协调统计
    state: Arc<RwLock<ReconcilerState>>,
}

/// 协调器状态
#[derive(Default, Debug, Clone)]
pub struct ReconcilerState {
    /// 已处理的网关次数
    pub gateways_processed: usize,
    /// 失败的协调次数
    pub failures: usize,
    /// 上次协调时间
    pub last_reconcile_time: Option<DateTime<Utc>>,
}

impl Reconciler {
    /// 创建新的协调器
    pub fn new(client: Arc<dyn ResourceClient>, config: ControllerConfig) -> Self {
        Self {
            client,
            config,
            state: Arc::new(RwLock::new(ReconcilerState::default())),
        }
    }

    /// 协调 Gateway 资源
    pub async fn reconcile(&self, gateway: Arc<Gateway>) -> Result<Action> {
        let name = gateway.name_any();
        let namespace = gateway.namespace().unwrap_or_else(|| "default".into());
        let span = info_span!("gateway", %namespace, %name);

        {
            let mut state = self.state.write().await;
            state.gateways_processed += 1;
            state.last_reconcile_time = Some(Utc::now());
        }

        let mut operation = GatewayOperation::new(&gateway, self.client.as_ref(), &self.config);
        match operation.operate().instrument(span).await {
            Ok(()) => Ok(Action::await_change()),
            // 校验错误需要用户修改清单，重新入队没有意义
            Err(Error::Validation(_)) => Ok(Action::await_change()),
            Err(e) => {
                self.state.write().await.failures += 1;
                Err(e)
            }
        }
    }

    /// 处理错误
    pub fn handle_error(&self, gateway: Arc<Gateway>, error: &Error) -> Action {
        let name = gateway.name_any();
        let namespace = gateway.namespace().unwrap_or_else(|| "default".into());

        error!("协调网关 {}/{} 失败: {}", namespace, name, error);

        Action::requeue(self.config.error_requeue())
    }

    /// 获取协调器状态
    pub async fn get_state(&self) -> ReconcilerState {
        self.state.read().await.clone()
    }
}
