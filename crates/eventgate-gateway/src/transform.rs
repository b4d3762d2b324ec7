//! 事件转换器
//!
//! 转换器与网关处理器运行在同一个 Pod 中。它把处理器派发来的原始负载
//! 包装成带上下文的事件，然后投递给当前快照中列出的每个传感器。

use hyper::body::Bytes;
use hyper::client::HttpConnector;
use hyper::{Body, Client, Request, Response};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use eventgate_common::{sensor_url, Error, GatewayEvent, Result, HEADER_EVENT_SOURCE};

use crate::config_watcher::ConfigStore;
use crate::metrics::GatewayMetrics;
use crate::server::{read_body, serve, MAX_BODY_BYTES};
use crate::webhook::{error_ack, success_ack};

/// 转换结果
#[derive(Debug, Clone)]
pub struct Transformed {
    /// 包装后的事件
    pub event: GatewayEvent,
    /// 需要投递的传感器地址
    pub targets: Vec<String>,
}

/// 事件转换器
pub struct Transformer {
    store: ConfigStore,
    namespace: String,
    client: Client<HttpConnector>,
    metrics: Arc<GatewayMetrics>,
}

impl Transformer {
    pub fn new(store: ConfigStore, namespace: &str, metrics: Arc<GatewayMetrics>) -> Self {
        Self {
            store,
            namespace: namespace.to_string(),
            client: Client::new(),
            metrics,
        }
    }

    /// 使用当前快照包装负载，尚无快照时拒绝
    pub async fn transform(&self, payload: Bytes, source: &str) -> Result<Transformed> {
        let config = self
            .store
            .current()
            .await
            .ok_or_else(|| Error::Config("尚未收到转换器配置".to_string()))?;

        let targets = config
            .sensors
            .iter()
            .map(|sensor| sensor_url(sensor, &self.namespace))
            .collect();

        Ok(Transformed {
            event: GatewayEvent::new(&config, source, payload.to_vec()),
            targets,
        })
    }

    /// 处理网关处理器派发来的请求
    pub async fn handle(self: &Arc<Self>, req: Request<Body>) -> Response<Body> {
        let source = req
            .headers()
            .get(HEADER_EVENT_SOURCE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let payload = match read_body(req.into_body(), MAX_BODY_BYTES).await {
            Ok(payload) => payload,
            Err(e) => {
                error!("读取负载失败: {}", e);
                self.metrics.requests_rejected.inc();
                return error_ack();
            }
        };

        match self.transform(payload, &source).await {
            Ok(transformed) => {
                info!("事件已转换: {}", transformed.event);
                self.metrics.requests_accepted.inc();
                let transformer = self.clone();
                tokio::spawn(async move { transformer.deliver(transformed).await });
                success_ack()
            }
            Err(e) => {
                warn!("拒绝来自 {} 的负载: {}", source, e);
                self.metrics.requests_rejected.inc();
                error_ack()
            }
        }
    }

    /// 向每个传感器投递事件，单个传感器失败不影响其他传感器
    pub async fn deliver(&self, transformed: Transformed) {
        let body = match serde_json::to_vec(&transformed.event) {
            Ok(body) => Bytes::from(body),
            Err(e) => {
                error!("序列化事件 {} 失败: {}", transformed.event.context.event_id, e);
                return;
            }
        };

        for target in &transformed.targets {
            match self.post(target, body.clone()).await {
                Ok(()) => {
                    self.metrics.events_dispatched.inc();
                    debug!("事件已投递到 {}", target);
                }
                Err(e) => {
                    self.metrics.dispatch_failures.inc();
                    error!("投递到 {} 失败: {}", target, e);
                }
            }
        }
    }

    async fn post(&self, target: &str, body: Bytes) -> Result<()> {
        let request = Request::post(target)
            .header(hyper::header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .map_err(|e| Error::Dispatch(e.to_string()))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::Dispatch(format!("传感器返回状态 {}", response.status())))
        }
    }

    /// 启动转换器 HTTP 服务器
    pub fn start(self: &Arc<Self>, addr: SocketAddr) -> Result<SocketAddr> {
        let transformer = self.clone();
        serve("转换器", addr, move |req| {
            let transformer = transformer.clone();
            async move { transformer.handle(req).await }
        })
    }
}
