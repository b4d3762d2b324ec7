//! 网关所属资源的构造
//!
//! 每个资源都带有指向网关的 controller ownerReference，
//! 网关删除后由平台的垃圾回收负责级联删除。

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, Container, EnvVar, PodSpec, PodTemplateSpec, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;

use eventgate_common::{
    deployment_name, service_name, transformer_config_map_name, TransformerConfig,
    ENV_NAMESPACE, ENV_TRANSFORMER_CONFIG_MAP, ENV_TRANSFORMER_PORT, LABEL_GATEWAY_NAME,
    PROCESSOR_CONTAINER_NAME, TRANSFORMER_CONTAINER_NAME,
};

use crate::config::ControllerConfig;
use crate::crd::Gateway;
use crate::error::{Error, Result};

/// 默认镜像拉取策略
pub const PULL_ALWAYS: &str = "Always";

fn owner_reference(gateway: &Gateway) -> Result<OwnerReference> {
    gateway.controller_owner_ref(&()).ok_or_else(|| {
        Error::MissingResource(format!("网关 {} 缺少 uid，无法建立归属关系", gateway.name_any()))
    })
}

fn namespace(gateway: &Gateway) -> Result<String> {
    gateway
        .namespace()
        .ok_or_else(|| Error::MissingResource(format!("网关 {} 未指定命名空间", gateway.name_any())))
}

fn gateway_labels(gateway: &Gateway) -> BTreeMap<String, String> {
    BTreeMap::from([(LABEL_GATEWAY_NAME.to_string(), gateway.name_any())])
}

fn owned_meta(gateway: &Gateway, name: String) -> Result<ObjectMeta> {
    Ok(ObjectMeta {
        name: Some(name),
        namespace: Some(namespace(gateway)?),
        owner_references: Some(vec![owner_reference(gateway)?]),
        ..Default::default()
    })
}

fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

/// 转换器读取的配置快照
pub fn transformer_config(gateway: &Gateway) -> TransformerConfig {
    TransformerConfig {
        event_type: gateway.spec.gateway_type.clone(),
        event_type_version: gateway.spec.version.clone(),
        sensors: gateway.spec.sensors.clone(),
        event_source: gateway.name_any(),
    }
}

/// 构造转换器 ConfigMap
pub fn transformer_config_map(gateway: &Gateway) -> Result<ConfigMap> {
    Ok(ConfigMap {
        metadata: owned_meta(gateway, transformer_config_map_name(&gateway.name_any()))?,
        data: Some(transformer_config(gateway).to_data()),
        ..Default::default()
    })
}

/// 构造网关 Deployment：处理器容器与转换器容器
///
/// 处理器的 `GATEWAY_PROCESSOR_CONFIG_MAP` 不由控制器注入，需由网关镜像的环境
/// 或 `EVENTGATE_RUNTIME_CONFIG` 指向的运行时配置文件（`gateway_config_map`）提供。
pub fn gateway_deployment(gateway: &Gateway, config: &ControllerConfig) -> Result<Deployment> {
    let name = gateway.name_any();
    let namespace = namespace(gateway)?;
    let deploy_spec = gateway
        .spec
        .deploy_spec
        .as_ref()
        .ok_or_else(|| Error::Validation("未指定网关部署规范".to_string()))?;

    let mut metadata = owned_meta(gateway, deployment_name(&name))?;
    metadata.labels = Some(gateway_labels(gateway));

    let processor = Container {
        name: PROCESSOR_CONTAINER_NAME.to_string(),
        image: Some(deploy_spec.image.clone()),
        image_pull_policy: Some(
            deploy_spec
                .image_pull_policy
                .clone()
                .unwrap_or_else(|| PULL_ALWAYS.to_string()),
        ),
        env: Some(vec![
            env(ENV_TRANSFORMER_PORT, config.transformer_port.to_string()),
            env(ENV_NAMESPACE, namespace.clone()),
        ]),
        ..Default::default()
    };

    let transformer = Container {
        name: TRANSFORMER_CONTAINER_NAME.to_string(),
        image: Some(config.transformer_image.clone()),
        image_pull_policy: Some(PULL_ALWAYS.to_string()),
        env: Some(vec![
            env(ENV_TRANSFORMER_CONFIG_MAP, transformer_config_map_name(&name)),
            env(ENV_NAMESPACE, namespace),
        ]),
        ..Default::default()
    };

    Ok(Deployment {
        metadata,
        spec: Some(DeploymentSpec {
            selector: LabelSelector {
                match_labels: Some(gateway_labels(gateway)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(gateway_labels(gateway)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: deploy_spec.service_account_name.clone(),
                    containers: vec![processor, transformer],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// 构造对外暴露网关的 Service
pub fn gateway_service(gateway: &Gateway) -> Result<Service> {
    let service = &gateway.spec.service;
    Ok(Service {
        metadata: owned_meta(gateway, service_name(&gateway.name_any()))?,
        spec: Some(ServiceSpec {
            selector: Some(gateway_labels(gateway)),
            ports: Some(vec![ServicePort {
                port: service.port,
                target_port: Some(IntOrString::Int(service.target_port)),
                ..Default::default()
            }]),
            type_: service.service_type.clone(),
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// 只替换处理器容器的镜像，其余字段保持不变
pub fn patch_processor_image(deployment: &mut Deployment, image: &str) -> Result<()> {
    let name = deployment_name_of(deployment);
    let container = deployment
        .spec
        .as_mut()
        .and_then(|spec| spec.template.spec.as_mut())
        .and_then(|pod| {
            pod.containers
                .iter_mut()
                .find(|c| c.name == PROCESSOR_CONTAINER_NAME)
        })
        .ok_or_else(|| {
            Error::MissingResource(format!(
                "Deployment {} 中没有 {} 容器",
                name,
                PROCESSOR_CONTAINER_NAME
            ))
        })?;

    container.image = Some(image.to_string());
    Ok(())
}

fn deployment_name_of(deployment: &Deployment) -> String {
    deployment.metadata.name.clone().unwrap_or_default()
}
