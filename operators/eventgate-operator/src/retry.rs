//! 状态更新重试
//!
//! 网关状态写入可能与其他写者并发，服务端以资源版本检测冲突。
//! 这里按固定的指数退避计划重新读取最新版本并只覆盖状态字段。

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::client::ResourceClient;
use crate::crd::{Gateway, GatewayPhase};
use crate::error::{Error, Result};

/// 指数退避计划
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    /// 首次重试前的等待时间（毫秒）
    pub initial_delay_ms: u64,
    /// 每次重试后等待时间的放大倍数
    pub factor: f64,
    /// 最多尝试次数
    pub steps: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 10,
            factor: 2.0,
            steps: 5,
        }
    }
}

impl RetryConfig {
    /// 第 `attempt` 次失败后的等待时间，从 0 开始计数
    pub fn delay(&self, attempt: u32) -> Duration {
        let millis = self.initial_delay_ms as f64 * self.factor.max(1.0).powi(attempt as i32);
        Duration::from_millis(millis as u64)
    }
}

/// 按退避计划反复执行单步操作
///
/// 单步返回 `Ok(Some(_))` 表示完成，`Ok(None)` 表示可恢复的失败，
/// `Err(_)` 立即终止。次数耗尽返回 [`Error::RetryExhausted`]。
pub async fn exponential_backoff<F, Fut, T>(config: &RetryConfig, mut step: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let steps = config.steps.max(1);

    for attempt in 0..steps {
        if let Some(value) = step().await? {
            return Ok(value);
        }
        if attempt + 1 < steps {
            let delay = config.delay(attempt);
            debug!("第 {} 次尝试未完成，{:?} 后重试", attempt + 1, delay);
            tokio::time::sleep(delay).await;
        }
    }

    Err(Error::RetryExhausted { attempts: steps })
}

/// 重新读取网关并写入期望状态
///
/// 冲突类错误按退避计划重试；读取失败或其他写入错误立即返回。
pub async fn reapply_update(
    client: &dyn ResourceClient,
    namespace: &str,
    name: &str,
    phase: GatewayPhase,
    config: &RetryConfig,
) -> Result<Gateway> {
    exponential_backoff(config, || async move {
        let mut latest = client.get_gateway(namespace, name).await?;
        latest.status = Some(phase);

        match client.update_gateway_status(&latest).await {
            Ok(updated) => Ok(Some(updated)),
            Err(e) if e.is_retryable() => {
                warn!("更新网关 {}/{} 状态冲突: {}", namespace, name, e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    })
    .await
}
