//! 错误处理模块
//!
//! 该模块提供 EventGate 网关运行时与共享模型的统一错误类型。

use std::io;
use thiserror::Error;

/// EventGate 统一错误类型
#[derive(Error, Debug)]
pub enum Error {
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 配置负载缺少必需的键
    #[error("ConfigMap '{config_map}' 缺少键 '{key}'")]
    MissingKey {
        /// ConfigMap 名称
        config_map: String,
        /// 缺失的键
        key: String,
    },

    /// 网络错误
    #[error("网络错误: {0}")]
    Network(String),

    /// 事件派发错误
    #[error("事件派发错误: {0}")]
    Dispatch(String),

    /// 指标错误
    #[error("指标错误: {0}")]
    Metrics(String),

    /// 序列化/反序列化错误
    #[error("序列化/反序列化错误: {0}")]
    Serialization(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] io::Error),

    /// JSON 错误
    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),
}

/// EventGate 结果类型别名
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// 构造缺失键错误
    pub fn missing_key(config_map: impl Into<String>, key: impl Into<String>) -> Self {
        Error::MissingKey {
            config_map: config_map.into(),
            key: key.into(),
        }
    }
}
