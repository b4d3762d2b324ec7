//! Operator 配置
//!
//! 配置来自可选的 YAML 文件，命令行参数可以覆盖其中的命名空间。

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use eventgate_common::{DEFAULT_TRANSFORMER_IMAGE, DEFAULT_TRANSFORMER_PORT};

use crate::error::{Error, Result};
use crate::retry::RetryConfig;

/// Operator 配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControllerConfig {
    /// 只协调该命名空间中的网关，未设置时协调全部命名空间
    pub namespace: Option<String>,
    /// 转换器容器镜像
    pub transformer_image: String,
    /// 转换器监听端口
    pub transformer_port: u16,
    /// 状态更新的退避计划
    pub retry: RetryConfig,
    /// 协调失败后的重新入队间隔（秒）
    pub error_requeue_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            transformer_image: DEFAULT_TRANSFORMER_IMAGE.to_string(),
            transformer_port: DEFAULT_TRANSFORMER_PORT,
            retry: RetryConfig::default(),
            error_requeue_secs: 30,
        }
    }
}

impl ControllerConfig {
    /// 从 YAML 文件加载配置
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("无法读取配置文件 {}: {}", path.display(), e)))?;
        Self::from_yaml(&content)
    }

    /// 解析 YAML 配置，缺失字段使用默认值
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::Config(format!("配置格式错误: {e}")))
    }

    /// 协调失败后的重新入队间隔
    pub fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.error_requeue_secs)
    }
}
