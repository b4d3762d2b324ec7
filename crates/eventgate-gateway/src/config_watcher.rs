//! ConfigMap 监听与配置快照
//!
//! 运行时只关心一个命名的 ConfigMap：新增和修改都会触发回调，
//! 删除被忽略，已生效的配置保持不变。

use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{
    api::Api,
    runtime::watcher::{self, watcher},
    runtime::WatchStreamExt,
    Client, ResourceExt,
};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use eventgate_common::{Result, TransformerConfig};

use crate::metrics::GatewayMetrics;

/// 监听命名空间中名为 `name` 的 ConfigMap，直到收到停止信号
///
/// 停止信号的发送端被丢弃同样会结束监听。监听出错后按 kube 默认退避重连。
pub fn watch_config_map<F, Fut>(
    client: Client,
    namespace: &str,
    name: &str,
    shutdown: oneshot::Receiver<()>,
    on_change: F,
) -> JoinHandle<()>
where
    F: FnMut(ConfigMap) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let api: Api<ConfigMap> = Api::namespaced(client, namespace);
    let config = watcher::Config::default().fields(&format!("metadata.name={name}"));
    let events = watcher(api, config).default_backoff();
    let target = format!("{namespace}/{name}");

    tokio::spawn(run_watch(target, events, shutdown, on_change))
}

/// 消费监听事件流，直到收到停止信号或事件流结束
pub async fn run_watch<S, F, Fut>(
    target: String,
    events: S,
    mut shutdown: oneshot::Receiver<()>,
    mut on_change: F,
) where
    S: Stream<Item = watcher::Result<watcher::Event<ConfigMap>>> + Send,
    F: FnMut(ConfigMap) -> Fut + Send,
    Fut: Future<Output = ()> + Send,
{
    info!("开始监听 ConfigMap {}", target);
    futures::pin_mut!(events);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("停止监听 ConfigMap {}", target);
                break;
            }
            event = events.next() => match event {
                Some(Ok(watcher::Event::Applied(config_map))) => on_change(config_map).await,
                Some(Ok(watcher::Event::Restarted(config_maps))) => {
                    for config_map in config_maps {
                        on_change(config_map).await;
                    }
                }
                Some(Ok(watcher::Event::Deleted(config_map))) => {
                    debug!("忽略 ConfigMap {} 的删除事件", config_map.name_any());
                }
                Some(Err(e)) => warn!("监听 ConfigMap {} 出错: {}", target, e),
                None => {
                    warn!("ConfigMap {} 的监听流已结束", target);
                    break;
                }
            }
        }
    }
}

/// 转换器配置快照
///
/// 读者总是拿到完整的快照；新 ConfigMap 解析失败时保留上一份快照。
#[derive(Clone, Default)]
pub struct ConfigStore {
    current: Arc<RwLock<Option<Arc<TransformerConfig>>>>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 ConfigMap 解析并替换快照
    pub async fn update(&self, config_map: &ConfigMap) -> Result<Arc<TransformerConfig>> {
        let data = config_map.data.clone().unwrap_or_default();
        let config = Arc::new(TransformerConfig::from_data(&config_map.name_any(), &data)?);
        *self.current.write().await = Some(config.clone());
        Ok(config)
    }

    /// 当前快照，尚未收到有效配置时为 `None`
    pub async fn current(&self) -> Option<Arc<TransformerConfig>> {
        self.current.read().await.clone()
    }
}

/// 转换器配置监听器
pub struct TransformerConfigWatcher {
    client: Client,
    namespace: String,
    store: ConfigStore,
    metrics: Arc<GatewayMetrics>,
}

impl TransformerConfigWatcher {
    pub fn new(
        client: Client,
        namespace: &str,
        store: ConfigStore,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
            store,
            metrics,
        }
    }

    /// 在后台监听转换器 ConfigMap 并刷新快照
    pub fn watch(&self, name: &str, shutdown: oneshot::Receiver<()>) -> JoinHandle<()> {
        let store = self.store.clone();
        let metrics = self.metrics.clone();
        watch_config_map(
            self.client.clone(),
            &self.namespace,
            name,
            shutdown,
            move |config_map| {
                let store = store.clone();
                let metrics = metrics.clone();
                async move { apply_update(&store, &metrics, &config_map).await }
            },
        )
    }
}

async fn apply_update(store: &ConfigStore, metrics: &GatewayMetrics, config_map: &ConfigMap) {
    match store.update(config_map).await {
        Ok(config) => {
            metrics.config_reloads.inc();
            info!(
                "转换器配置已更新: 类型 {} v{}，传感器 {:?}",
                config.event_type, config.event_type_version, config.sensors
            );
        }
        Err(e) => {
            metrics.config_reload_failures.inc();
            error!("转换器配置无效，保留当前配置: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventgate_common::{Error, KEY_EVENT_SOURCE, KEY_EVENT_TYPE, KEY_EVENT_TYPE_VERSION, KEY_SENSOR_LIST};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use futures::channel::mpsc;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tokio::sync::Mutex;

    type WatchEvent = watcher::Result<watcher::Event<ConfigMap>>;

    fn named(name: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn watch_error() -> WatchEvent {
        Err(watcher::Error::WatchError(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "too old resource version".to_string(),
            reason: "Expired".to_string(),
            code: 410,
        }))
    }

    /// 在后台运行监听循环，记录每次回调收到的 ConfigMap 名称
    fn spawn_watch(
        events: mpsc::UnboundedReceiver<WatchEvent>,
        shutdown: oneshot::Receiver<()>,
    ) -> (JoinHandle<()>, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let handle = tokio::spawn(run_watch(
            "events/hooks".to_string(),
            events,
            shutdown,
            move |config_map: ConfigMap| {
                let recorder = recorder.clone();
                async move { recorder.lock().await.push(config_map.name_any()) }
            },
        ));
        (handle, seen)
    }

    async fn wait_for(seen: &Mutex<Vec<String>>, count: usize) {
        for _ in 0..100 {
            if seen.lock().await.len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn config_map(pairs: &[(&str, &str)]) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some("hooks-gateway-transformer-configmap".to_string()),
                ..Default::default()
            },
            data: Some(
                pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..Default::default()
        }
    }

    fn complete(sensors: &str) -> ConfigMap {
        config_map(&[
            (KEY_EVENT_TYPE, "webhook"),
            (KEY_EVENT_TYPE_VERSION, "1.0"),
            (KEY_SENSOR_LIST, sensors),
            (KEY_EVENT_SOURCE, "hooks"),
        ])
    }

    #[tokio::test]
    async fn test_store_starts_empty() {
        assert!(ConfigStore::new().current().await.is_none());
    }

    #[tokio::test]
    async fn test_update_replaces_snapshot() {
        let store = ConfigStore::new();
        store.update(&complete("s1")).await.unwrap();
        store.update(&complete("s1,s2")).await.unwrap();

        let current = store.current().await.unwrap();
        assert_eq!(current.sensors, vec!["s1".to_string(), "s2".to_string()]);
        assert_eq!(current.event_source, "hooks");
    }

    #[tokio::test]
    async fn test_invalid_update_keeps_previous_snapshot() {
        let store = ConfigStore::new();
        store.update(&complete("s1")).await.unwrap();

        let err = store
            .update(&config_map(&[(KEY_EVENT_TYPE, "webhook")]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingKey { ref key, .. } if key == KEY_EVENT_TYPE_VERSION));

        assert_eq!(store.current().await.unwrap().sensors, vec!["s1".to_string()]);
    }

    #[tokio::test]
    async fn test_apply_update_counts_reloads() {
        let store = ConfigStore::new();
        let metrics = GatewayMetrics::new().unwrap();

        apply_update(&store, &metrics, &complete("s1")).await;
        apply_update(&store, &metrics, &ConfigMap::default()).await;

        assert_eq!(metrics.config_reloads.get(), 1);
        assert_eq!(metrics.config_reload_failures.get(), 1);
        assert!(store.current().await.is_some());
    }

    #[test_log::test(tokio::test)]
    async fn test_watch_applies_and_ignores_deletes() {
        let (tx, rx) = mpsc::unbounded();
        let (stop, stopped) = oneshot::channel();
        let (handle, seen) = spawn_watch(rx, stopped);

        tx.unbounded_send(Ok(watcher::Event::Restarted(vec![named("a"), named("b")])))
            .unwrap();
        tx.unbounded_send(Ok(watcher::Event::Deleted(named("a")))).unwrap();
        tx.unbounded_send(watch_error()).unwrap();
        tx.unbounded_send(Ok(watcher::Event::Applied(named("c")))).unwrap();
        wait_for(&seen, 3).await;

        stop.send(()).unwrap();
        handle.await.unwrap();
        assert_eq!(*seen.lock().await, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_watch_stops_promptly_after_errors() {
        let (tx, rx) = mpsc::unbounded();
        let (stop, stopped) = oneshot::channel();
        let (handle, _seen) = spawn_watch(rx, stopped);

        tx.unbounded_send(watch_error()).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        stop.send(()).unwrap();

        tokio::time::timeout(Duration::from_millis(200), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_watch_ends_when_stop_sender_dropped() {
        let (_tx, rx) = mpsc::unbounded();
        let (stop, stopped) = oneshot::channel::<()>();
        let (handle, _seen) = spawn_watch(rx, stopped);

        drop(stop);
        tokio::time::timeout(Duration::from_millis(200), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_watch_ends_with_stream() {
        let (tx, rx) = mpsc::unbounded();
        let (_stop, stopped) = oneshot::channel();
        let (handle, seen) = spawn_watch(rx, stopped);

        tx.unbounded_send(Ok(watcher::Event::Applied(named("a")))).unwrap();
        drop(tx);

        tokio::time::timeout(Duration::from_millis(200), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*seen.lock().await, vec!["a"]);
    }
}
