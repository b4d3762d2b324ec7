//! 网关配置管理
//!
//! 网关 ConfigMap 的每个键是一个独立的网关配置。ConfigMap 变化时
//! 与正在运行的配置对比：新增的启动，删除的停止，内容变化的先停止再启动。

use k8s_openapi::api::core::v1::ConfigMap;
use kube::Client;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config_watcher::watch_config_map;
use crate::metrics::GatewayMetrics;
use crate::webhook::RouteTable;

/// 一次变更需要执行的动作
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ConfigurationPlan {
    /// 需要停止的配置
    pub stop: Vec<String>,
    /// 需要启动的配置
    pub start: Vec<String>,
}

/// 对比运行中的配置与期望配置
pub fn plan(running: &HashMap<String, String>, desired: &BTreeMap<String, String>) -> ConfigurationPlan {
    let mut stop: Vec<String> = running
        .iter()
        .filter(|(key, raw)| desired.get(key.as_str()) != Some(*raw))
        .map(|(key, _)| key.clone())
        .collect();
    stop.sort();

    let start = desired
        .iter()
        .filter(|(key, raw)| running.get(key.as_str()) != Some(*raw))
        .map(|(key, _)| key.clone())
        .collect();

    ConfigurationPlan { stop, start }
}

struct RunningConfiguration {
    raw: String,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// 网关配置管理器
pub struct ConfigurationManager {
    routes: Arc<RouteTable>,
    metrics: Arc<GatewayMetrics>,
    running: Mutex<HashMap<String, RunningConfiguration>>,
}

impl ConfigurationManager {
    pub fn new(routes: Arc<RouteTable>, metrics: Arc<GatewayMetrics>) -> Self {
        Self {
            routes,
            metrics,
            running: Mutex::new(HashMap::new()),
        }
    }

    /// 使运行中的配置与 `desired` 一致
    pub async fn apply(&self, desired: &BTreeMap<String, String>) {
        let mut running = self.running.lock().await;
        let snapshot: HashMap<String, String> = running
            .iter()
            .map(|(key, config)| (key.clone(), config.raw.clone()))
            .collect();
        let plan = plan(&snapshot, desired);

        for key in plan.stop {
            if let Some(config) = running.remove(&key) {
                Self::stop_configuration(&key, config).await;
            }
        }

        for key in plan.start {
            let Some(raw) = desired.get(&key) else {
                continue;
            };
            match self.routes.activate(&key, raw).await {
                Ok(route) => {
                    let (stop, stopped) = oneshot::channel();
                    let routes = self.routes.clone();
                    let handle = tokio::spawn(async move { routes.serve_until(route, stopped).await });
                    info!("配置 {} 已启动", key);
                    running.insert(
                        key,
                        RunningConfiguration {
                            raw: raw.clone(),
                            stop,
                            handle,
                        },
                    );
                }
                Err(e) => error!("配置 {} 启动失败: {}", key, e),
            }
        }

        self.metrics.active_configurations.set(running.len() as i64);
    }

    // 等待旧配置完成注销，避免与同名的新配置抢占路由
    async fn stop_configuration(key: &str, config: RunningConfiguration) {
        let _ = config.stop.send(());
        if let Err(e) = config.handle.await {
            error!("配置 {} 停止时出错: {}", key, e);
        }
        info!("配置 {} 已停止", key);
    }

    /// 正在运行的配置
    pub async fn active(&self) -> Vec<String> {
        let running = self.running.lock().await;
        let mut keys: Vec<String> = running.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// 停止全部配置
    pub async fn shutdown(&self) {
        let mut running = self.running.lock().await;
        for (key, config) in running.drain() {
            Self::stop_configuration(&key, config).await;
        }
        self.metrics.active_configurations.set(0);
    }

    /// 在后台监听网关 ConfigMap
    pub fn watch(
        self: &Arc<Self>,
        client: Client,
        namespace: &str,
        name: &str,
        shutdown: oneshot::Receiver<()>,
    ) -> JoinHandle<()> {
        let manager = self.clone();
        watch_config_map(client, namespace, name, shutdown, move |config_map: ConfigMap| {
            let manager = manager.clone();
            async move {
                manager.metrics.config_reloads.inc();
                manager.apply(&config_map.data.unwrap_or_default()).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::ChannelDispatcher;
    use hyper::Method;

    fn desired(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn manager() -> (ConfigurationManager, Arc<RouteTable>) {
        let (dispatcher, _rx) = ChannelDispatcher::new();
        let metrics = Arc::new(GatewayMetrics::new().unwrap());
        let routes = Arc::new(RouteTable::new(Arc::new(dispatcher), metrics.clone()));
        (ConfigurationManager::new(routes.clone(), metrics), routes)
    }

    #[test]
    fn test_plan() {
        let running: HashMap<String, String> = [
            ("keep".to_string(), "a".to_string()),
            ("changed".to_string(), "b".to_string()),
            ("removed".to_string(), "c".to_string()),
        ]
        .into_iter()
        .collect();

        let plan = plan(
            &running,
            &desired(&[("keep", "a"), ("changed", "b2"), ("added", "d")]),
        );

        assert_eq!(plan.stop, vec!["changed".to_string(), "removed".to_string()]);
        assert_eq!(plan.start, vec!["added".to_string(), "changed".to_string()]);
    }

    #[tokio::test]
    async fn test_apply_starts_and_stops_configurations() {
        let (manager, routes) = manager();

        manager
            .apply(&desired(&[
                ("github", "endpoint: /github\nmethod: POST\n"),
                ("gitlab", "endpoint: /gitlab\nmethod: POST\n"),
            ]))
            .await;
        assert_eq!(manager.active().await, vec!["github", "gitlab"]);
        assert_eq!(routes.endpoints().await, vec!["/github", "/gitlab"]);

        manager
            .apply(&desired(&[("github", "endpoint: /github\nmethod: POST\n")]))
            .await;
        assert_eq!(manager.active().await, vec!["github"]);
        assert_eq!(routes.endpoints().await, vec!["/github"]);
    }

    #[test_log::test(tokio::test)]
    async fn test_changed_configuration_is_restarted() {
        let (manager, routes) = manager();

        manager
            .apply(&desired(&[("github", "endpoint: /github\nmethod: POST\n")]))
            .await;
        manager
            .apply(&desired(&[("github", "endpoint: /github\nmethod: PUT\n")]))
            .await;

        assert_eq!(routes.lookup("/github", &Method::POST).await, None);
        assert_eq!(
            routes.lookup("/github", &Method::PUT).await.as_deref(),
            Some("github")
        );
    }

    #[tokio::test]
    async fn test_invalid_configuration_is_skipped() {
        let (manager, routes) = manager();

        manager
            .apply(&desired(&[
                ("broken", "endpoint: /broken\n"),
                ("github", "endpoint: /github\nmethod: POST\n"),
            ]))
            .await;

        assert_eq!(manager.active().await, vec!["github"]);
        assert_eq!(routes.endpoints().await, vec!["/github"]);
    }

    #[tokio::test]
    async fn test_shutdown_stops_everything() {
        let (manager, routes) = manager();
        manager
            .apply(&desired(&[("github", "endpoint: /github\nmethod: POST\n")]))
            .await;

        manager.shutdown().await;

        assert!(manager.active().await.is_empty());
        assert!(routes.endpoints().await.is_empty());
        assert_eq!(manager.metrics.active_configurations.get(), 0);
    }
}
