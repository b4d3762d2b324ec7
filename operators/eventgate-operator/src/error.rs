//! 错误处理模块
//!
//! Operator 的统一错误类型，以及对 Kubernetes API 错误的分类。

use thiserror::Error;

/// Operator 错误类型
#[derive(Error, Debug)]
pub enum Error {
    /// 网关定义校验失败，不重试
    #[error("网关校验失败: {0}")]
    Validation(String),

    /// Kubernetes API 错误
    #[error("Kubernetes API 错误: {0}")]
    Kube(#[from] kube::Error),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 资源缺少预期内容
    #[error("资源缺失: {0}")]
    MissingResource(String),

    /// 状态更新在退避计划内未能完成
    #[error("重试 {attempts} 次后仍未能更新网关状态")]
    RetryExhausted {
        /// 已尝试次数
        attempts: u32,
    },

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),
}

/// Operator 结果类型别名
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// 是否属于可重试的 API 错误：版本冲突、限流或服务端超时
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube(kube::Error::Api(resp)) => {
                (resp.code == 409 && resp.reason == "Conflict")
                    || resp.code == 429
                    || (resp.code == 500 && resp.reason == "ServerTimeout")
                    || resp.code == 504
            }
            _ => false,
        }
    }

    /// 资源是否已存在
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            Error::Kube(kube::Error::Api(resp)) if resp.code == 409 && resp.reason == "AlreadyExists"
        )
    }

    /// 资源是否不存在
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kube(kube::Error::Api(resp)) if resp.code == 404)
    }
}

/// 构造 API 错误响应，供测试模拟远端行为
#[cfg(test)]
pub(crate) fn api_error(code: u16, reason: &str) -> Error {
    Error::Kube(kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: format!("simulated {reason}"),
        reason: reason.to_string(),
        code,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(api_error(409, "Conflict").is_retryable());
        assert!(api_error(429, "TooManyRequests").is_retryable());
        assert!(api_error(500, "ServerTimeout").is_retryable());
        assert!(api_error(504, "Timeout").is_retryable());

        assert!(!api_error(409, "AlreadyExists").is_retryable());
        assert!(!api_error(404, "NotFound").is_retryable());
        assert!(!api_error(500, "InternalError").is_retryable());
        assert!(!Error::Validation("x".to_string()).is_retryable());

        assert!(api_error(409, "AlreadyExists").is_already_exists());
        assert!(api_error(404, "NotFound").is_not_found());
    }
}
