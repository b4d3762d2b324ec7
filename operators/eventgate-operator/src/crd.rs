//! 自定义资源定义模块
//!
//! 该模块定义了 EventGate 的 Gateway 自定义资源。用户通过清单创建 Gateway，
//! Operator 只负责写入其状态字段。

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 网关规范
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[kube(group = "eventgate.io", version = "v1alpha1", kind = "Gateway", namespaced)]
#[kube(status = "GatewayPhase")]
#[kube(printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status"}"#)]
#[kube(printcolumn = r#"{"name":"Type", "type":"string", "jsonPath":".spec.type"}"#)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySpec {
    /// 网关工作负载的部署规范
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_spec: Option<DeploySpec>,

    /// 网关类型，例如 webhook、calendar
    #[serde(rename = "type", default)]
    pub gateway_type: String,

    /// 事件类型版本
    #[serde(default)]
    pub version: String,

    /// 事件派发机制
    pub dispatch_mechanism: DispatchMechanism,

    /// 关注该网关事件的监听方
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watchers: Option<NotificationWatchers>,

    /// 接收事件的传感器列表
    #[serde(default)]
    pub sensors: Vec<String>,

    /// 对外暴露的服务，端口为 0 时不创建
    #[serde(default)]
    pub service: GatewayService,
}

/// 部署规范
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeploySpec {
    /// 处理器容器镜像
    pub image: String,

    /// 镜像拉取策略，未设置时使用 Always
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,

    /// 工作负载使用的 ServiceAccount
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
}

/// 事件派发机制
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum DispatchMechanism {
    /// 通过 HTTP 派发，需要至少一个监听方
    #[serde(rename = "HTTP")]
    Http,
    /// 通过 NATS 派发
    #[serde(rename = "NATS")]
    Nats,
    /// 通过 Kafka 派发
    #[serde(rename = "Kafka")]
    Kafka,
}

/// 监听方集合
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationWatchers {
    /// 监听的网关
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateways: Option<Vec<GatewayWatcher>>,

    /// 监听的传感器
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensors: Option<Vec<SensorWatcher>>,
}

impl NotificationWatchers {
    /// 是否没有任何监听方
    pub fn is_empty(&self) -> bool {
        self.gateways.as_ref().map_or(true, Vec::is_empty)
            && self.sensors.as_ref().map_or(true, Vec::is_empty)
    }
}

/// 网关监听方
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GatewayWatcher {
    /// 网关名称
    pub name: String,
    /// 网关端口
    pub port: String,
    /// 接收事件的端点
    pub endpoint: String,
}

/// 传感器监听方
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct SensorWatcher {
    /// 传感器名称
    pub name: String,
}

/// 网关服务定义
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GatewayService {
    /// 服务端口
    #[serde(default)]
    pub port: i32,

    /// 容器目标端口
    #[serde(default)]
    pub target_port: i32,

    /// 服务类型：ClusterIP、NodePort、LoadBalancer
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,
}

/// 网关状态
///
/// 只能在 New -> Running、Error -> Running 之间迁移，
/// 部署失败时 New -> Error。
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum GatewayPhase {
    /// 新建，尚未创建任何资源
    New,
    /// 资源已创建
    Running,
    /// 资源创建失败，等待修复
    Error,
}

impl fmt::Display for GatewayPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayPhase::New => write!(f, "New"),
            GatewayPhase::Running => write!(f, "Running"),
            GatewayPhase::Error => write!(f, "Error"),
        }
    }
}

impl Gateway {
    /// 当前状态，缺省视为 New
    pub fn phase(&self) -> GatewayPhase {
        self.status.unwrap_or(GatewayPhase::New)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
apiVersion: eventgate.io/v1alpha1
kind: Gateway
metadata:
  name: webhook-gateway
  namespace: events
spec:
  deploySpec:
    image: eventgate/webhook-gateway:v0.1
    serviceAccountName: eventgate-sa
  type: webhook
  version: "1.0"
  dispatchMechanism: HTTP
  watchers:
    sensors:
      - name: webhook-sensor
  sensors:
    - webhook-sensor
  service:
    port: 12000
    targetPort: 12000
    type: LoadBalancer
"#;

    #[test]
    fn test_manifest_decodes() {
        let gateway: Gateway = serde_yaml::from_str(MANIFEST).unwrap();
        assert_eq!(gateway.spec.gateway_type, "webhook");
        assert_eq!(gateway.spec.dispatch_mechanism, DispatchMechanism::Http);
        assert_eq!(gateway.spec.service.port, 12000);
        assert_eq!(
            gateway.spec.service.service_type.as_deref(),
            Some("LoadBalancer")
        );
        let deploy = gateway.spec.deploy_spec.as_ref().unwrap();
        assert_eq!(deploy.image_pull_policy, None);
        assert!(!gateway.spec.watchers.as_ref().unwrap().is_empty());
        assert_eq!(gateway.phase(), GatewayPhase::New);
    }

    #[test]
    fn test_unknown_dispatch_mechanism_is_rejected() {
        let manifest = MANIFEST.replace("dispatchMechanism: HTTP", "dispatchMechanism: SMTP");
        assert!(serde_yaml::from_str::<Gateway>(&manifest).is_err());
    }

    #[test]
    fn test_unknown_phase_is_rejected() {
        let manifest = format!("{MANIFEST}status: Paused\n");
        assert!(serde_yaml::from_str::<Gateway>(&manifest).is_err());

        let manifest = format!("{MANIFEST}status: Error\n");
        let gateway: Gateway = serde_yaml::from_str(&manifest).unwrap();
        assert_eq!(gateway.phase(), GatewayPhase::Error);
    }
}
