//! 资源命名约定
//!
//! 控制器创建的资源与网关工作负载读取的环境变量必须使用同一套名称，
//! 因此集中定义在这里。

/// 网关名称标签，用于 Deployment 选择器和 Service 选择器
pub const LABEL_GATEWAY_NAME: &str = "eventgate.io/gateway-name";

/// 处理器容器名称
pub const PROCESSOR_CONTAINER_NAME: &str = "gateway-processor";

/// 转换器容器名称
pub const TRANSFORMER_CONTAINER_NAME: &str = "gateway-transformer";

/// 平台提供的转换器镜像
pub const DEFAULT_TRANSFORMER_IMAGE: &str = "eventgate/gateway-transformer";

/// 转换器监听端口
pub const DEFAULT_TRANSFORMER_PORT: u16 = 9300;

/// 传感器接收事件的端口
pub const SENSOR_PORT: u16 = 9300;

/// 转换器端口环境变量
pub const ENV_TRANSFORMER_PORT: &str = "TRANSFORMER_PORT";

/// 命名空间环境变量
pub const ENV_NAMESPACE: &str = "MY_POD_NAMESPACE";

/// 转换器 ConfigMap 名称环境变量
pub const ENV_TRANSFORMER_CONFIG_MAP: &str = "GATEWAY_TRANSFORMER_CONFIG_MAP";

/// 网关配置 ConfigMap 名称环境变量
pub const ENV_GATEWAY_CONFIG_MAP: &str = "GATEWAY_PROCESSOR_CONFIG_MAP";

/// 事件来源所在的 HTTP 头
pub const HEADER_EVENT_SOURCE: &str = "x-event-source";

/// 转换器 ConfigMap 名称
pub fn transformer_config_map_name(gateway: &str) -> String {
    format!("{gateway}-gateway-transformer-configmap")
}

/// 网关 Deployment 名称
pub fn deployment_name(gateway: &str) -> String {
    gateway.to_string()
}

/// 网关 Service 名称
pub fn service_name(gateway: &str) -> String {
    format!("{gateway}-gateway-svc")
}

/// 传感器 Service 的集群内地址
pub fn sensor_url(sensor: &str, namespace: &str) -> String {
    format!("http://{sensor}-sensor-svc.{namespace}.svc.cluster.local:{SENSOR_PORT}/")
}
