//! 运行时配置
//!
//! 按默认值、可选的 YAML 文件、`EVENTGATE_` 前缀环境变量的顺序叠加，后者覆盖前者。
//! Operator 注入的四个变量（命名空间、转换器端口、两个 ConfigMap 名称）按原名读取，
//! 优先级最高。其余进程环境变量一律忽略，Kubernetes 为同命名空间 Service
//! 注入的 `<SVC>_PORT=tcp://...` 不会干扰解析。

use config::{Config, ConfigBuilder, Environment, File};
use config::builder::DefaultState;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

use eventgate_common::{
    Error, Result, DEFAULT_TRANSFORMER_PORT, ENV_GATEWAY_CONFIG_MAP, ENV_NAMESPACE,
    ENV_TRANSFORMER_CONFIG_MAP, ENV_TRANSFORMER_PORT,
};

/// 运行时专用参数的环境变量前缀
pub const ENV_PREFIX: &str = "EVENTGATE";

/// Operator 注入的环境变量与配置键
const POD_ENV: [(&str, &str); 4] = [
    (ENV_NAMESPACE, "namespace"),
    (ENV_TRANSFORMER_PORT, "transformer_port"),
    (ENV_TRANSFORMER_CONFIG_MAP, "transformer_config_map"),
    (ENV_GATEWAY_CONFIG_MAP, "gateway_config_map"),
];

/// 运行时配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Pod 所在命名空间（`MY_POD_NAMESPACE`）
    pub namespace: String,
    /// 转换器监听端口（`TRANSFORMER_PORT`）
    pub transformer_port: u16,
    /// 转换器 ConfigMap 名称（`GATEWAY_TRANSFORMER_CONFIG_MAP`）
    #[serde(default)]
    pub transformer_config_map: Option<String>,
    /// 网关配置 ConfigMap 名称（`GATEWAY_PROCESSOR_CONFIG_MAP`）
    #[serde(default)]
    pub gateway_config_map: Option<String>,
    /// Webhook 服务器端口；设置后启动时立即监听，网关配置中的端口不再生效
    #[serde(default)]
    pub server_port: Option<u16>,
    /// 处理器指标端口
    pub metrics_port: u16,
    /// 转换器指标端口，与处理器位于同一 Pod，不能与之相同
    pub transformer_metrics_port: u16,
}

impl RuntimeConfig {
    /// 从进程环境加载配置，`path` 不存在时跳过文件层
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, |name| std::env::var(name).ok())
    }

    /// 加载配置，Operator 注入的变量通过 `lookup` 读取
    pub fn load_with<L>(path: Option<&Path>, lookup: L) -> Result<Self>
    where
        L: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::defaults().map_err(|e| Error::Config(e.to_string()))?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }
        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        for (name, key) in POD_ENV {
            builder = builder
                .set_override_option(key, lookup(name))
                .map_err(|e| Error::Config(e.to_string()))?;
        }

        builder
            .build()
            .and_then(|config| config.try_deserialize::<RuntimeConfig>())
            .map_err(|e| Error::Config(format!("加载运行时配置失败: {e}")))
    }

    fn defaults() -> std::result::Result<ConfigBuilder<DefaultState>, config::ConfigError> {
        Config::builder()
            .set_default("namespace", "default")?
            .set_default("transformer_port", i64::from(DEFAULT_TRANSFORMER_PORT))?
            .set_default("metrics_port", 9090_i64)?
            .set_default("transformer_metrics_port", 9091_i64)
    }

    /// 转换器 ConfigMap 名称，未配置时报错
    pub fn require_transformer_config_map(&self) -> Result<&str> {
        self.transformer_config_map
            .as_deref()
            .ok_or_else(|| Error::Config(format!("未设置 {ENV_TRANSFORMER_CONFIG_MAP}")))
    }

    /// 网关配置 ConfigMap 名称，未配置时报错
    pub fn require_gateway_config_map(&self) -> Result<&str> {
        self.gateway_config_map
            .as_deref()
            .ok_or_else(|| Error::Config(format!("未设置 {ENV_GATEWAY_CONFIG_MAP}")))
    }

    pub fn server_addr(&self) -> Option<SocketAddr> {
        self.server_port
            .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    }

    pub fn transformer_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.transformer_port))
    }

    pub fn metrics_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.metrics_port))
    }

    pub fn transformer_metrics_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.transformer_metrics_port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn no_pod_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_file_layer_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "metrics_port: 9191\ngateway_config_map: hooks-gateway-configmap"
        )
        .unwrap();

        let config = RuntimeConfig::load_with(Some(file.path()), no_pod_env).unwrap();

        assert_eq!(config.metrics_port, 9191);
        assert_eq!(
            config.require_gateway_config_map().unwrap(),
            "hooks-gateway-configmap"
        );
        assert_eq!(config.metrics_addr().port(), 9191);
    }

    #[test]
    fn test_pod_env_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "namespace: from-file\ntransformer_port: 9400").unwrap();

        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_NAMESPACE, "events"),
            (ENV_TRANSFORMER_PORT, "9500"),
            (ENV_TRANSFORMER_CONFIG_MAP, "hooks-gateway-transformer-configmap"),
        ]);
        let config = RuntimeConfig::load_with(Some(file.path()), |name| {
            env.get(name).map(|value| value.to_string())
        })
        .unwrap();

        assert_eq!(config.namespace, "events");
        assert_eq!(config.transformer_port, 9500);
        assert_eq!(
            config.require_transformer_config_map().unwrap(),
            "hooks-gateway-transformer-configmap"
        );
        assert_eq!(config.gateway_config_map, None);
    }

    #[test]
    fn test_service_link_variables_are_ignored() {
        // Service 名为 metrics / server 时 kubelet 注入的变量
        std::env::set_var("METRICS_PORT", "tcp://10.0.0.7:9090");
        std::env::set_var("SERVER_PORT", "tcp://10.0.0.8:80");

        let config = RuntimeConfig::load_with(None, no_pod_env).unwrap();

        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.server_port, None);
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let config =
            RuntimeConfig::load_with(Some(Path::new("/nonexistent/eventgate.yaml")), no_pod_env)
                .unwrap();
        assert_eq!(config.transformer_port, DEFAULT_TRANSFORMER_PORT);
        assert_eq!(config.namespace, "default");
    }

    #[test]
    fn test_missing_config_map_name() {
        let config = RuntimeConfig {
            namespace: "events".to_string(),
            transformer_port: DEFAULT_TRANSFORMER_PORT,
            transformer_config_map: None,
            gateway_config_map: None,
            server_port: None,
            metrics_port: 9090,
            transformer_metrics_port: 9091,
        };
        assert!(matches!(
            config.require_transformer_config_map(),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            config.require_gateway_config_map(),
            Err(Error::Config(ref msg)) if msg.contains(ENV_GATEWAY_CONFIG_MAP)
        ));
        assert_eq!(config.transformer_addr().port(), DEFAULT_TRANSFORMER_PORT);
        assert_eq!(config.server_addr(), None);
    }
}
