//! 远程资源客户端
//!
//! 协调逻辑只通过 `ResourceClient` 访问集群，便于在测试中模拟
//! 冲突、创建失败等远端行为。

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::{
    api::{Api, PostParams},
    client::Client,
    ResourceExt,
};

use crate::crd::Gateway;
use crate::error::{Error, Result};

/// 针对 Gateway、ConfigMap、Deployment、Service 的类型化操作
///
/// `update_*` 在提交的资源版本过期时必须返回可重试的冲突错误。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// 读取网关的最新版本
    async fn get_gateway(&self, namespace: &str, name: &str) -> Result<Gateway>;

    /// 写入网关状态
    async fn update_gateway_status(&self, gateway: &Gateway) -> Result<Gateway>;

    /// 创建 ConfigMap
    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap>;

    /// 创建 Deployment
    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment>;

    /// 读取 Deployment
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment>;

    /// 更新 Deployment
    async fn update_deployment(&self, deployment: &Deployment) -> Result<Deployment>;

    /// 创建 Service
    async fn create_service(&self, service: &Service) -> Result<Service>;
}

/// 基于 kube-rs 的客户端实现
#[derive(Clone)]
pub struct KubeResourceClient {
    /// Kubernetes 客户端
    client: Client,
}

impl KubeResourceClient {
    /// 创建新的资源客户端
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn namespaced<K>(&self, namespace: &str) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn namespace_of<K: ResourceExt>(resource: &K) -> Result<String> {
    resource.namespace().ok_or_else(|| {
        Error::MissingResource(format!("资源 {} 未指定命名空间", resource.name_any()))
    })
}

#[async_trait]
impl ResourceClient for KubeResourceClient {
    async fn get_gateway(&self, namespace: &str, name: &str) -> Result<Gateway> {
        Ok(self.namespaced::<Gateway>(namespace).get(name).await?)
    }

    async fn update_gateway_status(&self, gateway: &Gateway) -> Result<Gateway> {
        let namespace = namespace_of(gateway)?;
        // 请求体携带 resourceVersion，过期时服务端返回 409 Conflict
        let body = serde_json::to_vec(gateway)?;
        Ok(self
            .namespaced::<Gateway>(&namespace)
            .replace_status(&gateway.name_any(), &PostParams::default(), body)
            .await?)
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap> {
        let namespace = namespace_of(config_map)?;
        Ok(self
            .namespaced::<ConfigMap>(&namespace)
            .create(&PostParams::default(), config_map)
            .await?)
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment> {
        let namespace = namespace_of(deployment)?;
        Ok(self
            .namespaced::<Deployment>(&namespace)
            .create(&PostParams::default(), deployment)
            .await?)
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment> {
        Ok(self.namespaced::<Deployment>(namespace).get(name).await?)
    }

    async fn update_deployment(&self, deployment: &Deployment) -> Result<Deployment> {
        let namespace = namespace_of(deployment)?;
        Ok(self
            .namespaced::<Deployment>(&namespace)
            .replace(&deployment.name_any(), &PostParams::default(), deployment)
            .await?)
    }

    async fn create_service(&self, service: &Service) -> Result<Service> {
        let namespace = namespace_of(service)?;
        Ok(self
            .namespaced::<Service>(&namespace)
            .create(&PostParams::default(), service)
            .await?)
    }
}
