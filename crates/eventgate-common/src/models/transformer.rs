//! 转换器配置快照
//!
//! 控制器把网关的事件类型、版本、来源与传感器列表写入一个扁平的
//! 键值 ConfigMap；转换器容器读取同一份负载。编码与解码都在这里，
//! 保证两端对传感器列表的拼接与拆分保持对称。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{Error, Result};

/// 事件类型键
pub const KEY_EVENT_TYPE: &str = "event-type";
/// 事件类型版本键
pub const KEY_EVENT_TYPE_VERSION: &str = "event-type-version";
/// 传感器列表键
pub const KEY_SENSOR_LIST: &str = "sensor-list";
/// 事件来源键
pub const KEY_EVENT_SOURCE: &str = "event-source";

const SENSOR_SEPARATOR: char = ',';

/// 转换器配置快照
///
/// 只有四个键全部存在时才能构造，因此持有者永远不会看到部分更新的配置。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformerConfig {
    /// 事件类型
    pub event_type: String,
    /// 事件类型版本
    pub event_type_version: String,
    /// 接收事件的传感器，保持声明顺序
    pub sensors: Vec<String>,
    /// 事件来源（网关名称）
    pub event_source: String,
}

impl TransformerConfig {
    /// 从 ConfigMap 的键值负载解析快照
    pub fn from_data(config_map: &str, data: &BTreeMap<String, String>) -> Result<Self> {
        let get = |key: &str| {
            data.get(key)
                .cloned()
                .ok_or_else(|| Error::missing_key(config_map, key))
        };

        let event_type = get(KEY_EVENT_TYPE)?;
        let event_type_version = get(KEY_EVENT_TYPE_VERSION)?;
        let sensors = split_sensors(&get(KEY_SENSOR_LIST)?);
        let event_source = get(KEY_EVENT_SOURCE)?;
        debug!("ConfigMap {} 解析出 {} 个传感器", config_map, sensors.len());

        Ok(Self {
            event_type,
            event_type_version,
            sensors,
            event_source,
        })
    }

    /// 编码为 ConfigMap 的键值负载
    pub fn to_data(&self) -> BTreeMap<String, String> {
        let mut data = BTreeMap::new();
        data.insert(KEY_EVENT_SOURCE.to_string(), self.event_source.clone());
        data.insert(
            KEY_EVENT_TYPE_VERSION.to_string(),
            self.event_type_version.clone(),
        );
        data.insert(KEY_EVENT_TYPE.to_string(), self.event_type.clone());
        data.insert(KEY_SENSOR_LIST.to_string(), join_sensors(&self.sensors));
        data
    }
}

/// 拼接传感器列表
pub fn join_sensors(sensors: &[String]) -> String {
    sensors.join(&SENSOR_SEPARATOR.to_string())
}

/// 拆分传感器列表，空字符串视为空列表
pub fn split_sensors(raw: &str) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split(SENSOR_SEPARATOR).map(str::to_string).collect()
}
