//! 事件信封
//!
//! 转换器把网关收到的原始负载包装为带上下文的事件，再派发给传感器。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::models::transformer::TransformerConfig;

/// 事件上下文
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventContext {
    /// 事件唯一标识
    pub event_id: String,
    /// 事件类型
    pub event_type: String,
    /// 事件类型版本
    pub event_type_version: String,
    /// 事件来源，格式为 `<网关>:<配置>`
    pub source: String,
    /// 事件生成时间
    pub event_time: DateTime<Utc>,
    /// 负载内容类型
    pub content_type: String,
}

/// 网关事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayEvent {
    /// 事件上下文
    pub context: EventContext,
    /// 原始负载，不做任何修改
    pub payload: Vec<u8>,
}

impl GatewayEvent {
    /// 使用当前配置快照包装负载
    pub fn new(config: &TransformerConfig, source: &str, payload: Vec<u8>) -> Self {
        Self {
            context: EventContext {
                event_id: Uuid::new_v4().to_string(),
                event_type: config.event_type.clone(),
                event_type_version: config.event_type_version.clone(),
                source: format!("{}:{}", config.event_source, source),
                event_time: Utc::now(),
                content_type: "application/json".to_string(),
            },
            payload,
        }
    }
}

impl fmt::Display for GatewayEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} v{}) from {}",
            self.context.event_id,
            self.context.event_type,
            self.context.event_type_version,
            self.context.source
        )
    }
}
