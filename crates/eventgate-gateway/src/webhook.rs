//! Webhook 路由表
//!
//! 进程内只有一个 HTTP 服务器，多个网关配置把各自的 (路径, 方法) 注册到
//! 同一张路由表上。请求到达时按路由表查找产生该路由的配置，
//! 立即返回确认，负载在后台任务中派发。
//!
//! 路由表的读写都在同一把锁下进行；某个路径上的最后一个方法注销后
//! 整个路径从表中移除，之后该路径的请求按未知路径处理。

use hyper::body::Bytes;
use hyper::{Body, Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, error, info, warn};

use eventgate_common::{Error, Result};

use crate::dispatch::EventDispatcher;
use crate::metrics::GatewayMetrics;
use crate::server::{read_body, serve, text_response, MAX_BODY_BYTES};

/// 请求被接受时的确认内容
pub const SUCCESS_ACK: &str = "request successfully processed";
/// 请求被拒绝时的确认内容
pub const ERROR_ACK: &str = "failed to process the request";

pub fn success_ack() -> Response<Body> {
    text_response(StatusCode::OK, SUCCESS_ACK)
}

pub fn error_ack() -> Response<Body> {
    text_response(StatusCode::BAD_REQUEST, ERROR_ACK)
}

/// 单个网关配置声明的 Webhook
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hook {
    /// 请求路径
    #[serde(default)]
    pub endpoint: String,
    /// HTTP 方法
    #[serde(default)]
    pub method: String,
    /// 服务器监听端口，只有首次启动服务器时生效
    #[serde(default)]
    pub port: String,
}

impl Hook {
    /// 解析 YAML 形式的配置
    pub fn parse(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).map_err(|e| Error::Serialization(format!("无法解析 Webhook 配置: {e}")))
    }

    fn route(&self) -> Result<(String, Method)> {
        if self.endpoint.is_empty() || self.method.is_empty() {
            return Err(Error::Config("Webhook 配置缺少 endpoint 或 method".to_string()));
        }
        let endpoint = if self.endpoint.starts_with('/') {
            self.endpoint.clone()
        } else {
            format!("/{}", self.endpoint)
        };
        let method = Method::from_bytes(self.method.to_uppercase().as_bytes())
            .map_err(|_| Error::Config(format!("无效的 HTTP 方法: {}", self.method)))?;
        Ok((endpoint, method))
    }

    fn listen_addr(&self) -> Result<Option<SocketAddr>> {
        if self.port.is_empty() {
            return Ok(None);
        }
        let port: u16 = self
            .port
            .parse()
            .map_err(|_| Error::Config(format!("无效的端口: {}", self.port)))?;
        Ok(Some(SocketAddr::from(([0, 0, 0, 0], port))))
    }
}

/// 已注册到路由表的路由
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveRoute {
    pub endpoint: String,
    pub method: Method,
    pub source: String,
}

/// 路径 -> 方法 -> 注册该路由的配置
type Routes = HashMap<String, HashMap<Method, String>>;

/// Webhook 路由表
pub struct RouteTable {
    routes: Mutex<Routes>,
    started: AtomicBool,
    dispatcher: Arc<dyn EventDispatcher>,
    metrics: Arc<GatewayMetrics>,
}

impl RouteTable {
    pub fn new(dispatcher: Arc<dyn EventDispatcher>, metrics: Arc<GatewayMetrics>) -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            started: AtomicBool::new(false),
            dispatcher,
            metrics,
        }
    }

    /// 启动共享 HTTP 服务器
    ///
    /// 只有第一次调用会绑定端口并返回监听地址，之后的调用返回 `Ok(None)`。
    pub fn start(self: &Arc<Self>, addr: SocketAddr) -> Result<Option<SocketAddr>> {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("HTTP 服务器已启动，忽略端口 {}", addr.port());
            return Ok(None);
        }

        let table = self.clone();
        let result = serve("Webhook", addr, move |req| {
            let table = table.clone();
            async move { table.handle(req).await }
        });

        match result {
            Ok(local_addr) => Ok(Some(local_addr)),
            Err(e) => {
                self.started.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// 注册路由，同一 (路径, 方法) 以最后一次注册为准
    pub async fn register(&self, endpoint: &str, method: Method, source: &str) {
        let mut routes = self.routes.lock().await;
        let methods = routes.entry(endpoint.to_string()).or_default();
        if let Some(previous) = methods.insert(method.clone(), source.to_string()) {
            if previous != source {
                warn!(
                    "路由 {} {} 由配置 {} 接管，原配置: {}",
                    method, endpoint, source, previous
                );
            }
        }
        info!("注册路由 {} {}，配置: {}", method, endpoint, source);
    }

    /// 注销路由
    ///
    /// 只有当前归属 `source` 的路由会被移除，返回是否移除。
    pub async fn deregister(&self, endpoint: &str, method: &Method, source: &str) -> bool {
        let mut routes = self.routes.lock().await;
        let Some(methods) = routes.get_mut(endpoint) else {
            return false;
        };
        if methods.get(method).map(String::as_str) != Some(source) {
            return false;
        }

        methods.remove(method);
        if methods.is_empty() {
            routes.remove(endpoint);
        }
        info!("注销路由 {} {}，配置: {}", method, endpoint, source);
        true
    }

    /// 查询 (路径, 方法) 当前归属的配置
    pub async fn lookup(&self, endpoint: &str, method: &Method) -> Option<String> {
        let routes = self.routes.lock().await;
        routes.get(endpoint).and_then(|methods| methods.get(method)).cloned()
    }

    /// 当前有活跃路由的路径
    pub async fn endpoints(&self) -> Vec<String> {
        let routes = self.routes.lock().await;
        let mut endpoints: Vec<String> = routes.keys().cloned().collect();
        endpoints.sort();
        endpoints
    }

    /// 处理一个入站请求
    pub async fn handle(&self, req: Request<Body>) -> Response<Body> {
        let endpoint = req.uri().path().to_string();
        let method = req.method().clone();

        let Some(source) = self.lookup(&endpoint, &method).await else {
            warn!("没有匹配的路由: {} {}", method, endpoint);
            self.metrics.requests_rejected.inc();
            return error_ack();
        };

        let payload = match read_body(req.into_body(), MAX_BODY_BYTES).await {
            Ok(payload) => payload,
            Err(e) => {
                error!("读取请求体失败 {} {}: {}", method, endpoint, e);
                self.metrics.requests_rejected.inc();
                return error_ack();
            }
        };

        info!("收到请求 {} {}，配置: {}", method, endpoint, source);
        self.metrics.requests_accepted.inc();
        self.spawn_dispatch(payload, source);
        success_ack()
    }

    fn spawn_dispatch(&self, payload: Bytes, source: String) {
        let dispatcher = self.dispatcher.clone();
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            match dispatcher.dispatch(payload, &source).await {
                Ok(()) => metrics.events_dispatched.inc(),
                Err(e) => {
                    metrics.dispatch_failures.inc();
                    error!("派发配置 {} 的负载失败: {}", source, e);
                }
            }
        });
    }

    /// 解析配置、按需启动服务器并注册路由
    pub async fn activate(self: &Arc<Self>, source: &str, raw: &str) -> Result<ActiveRoute> {
        debug!("解析配置 {}", source);
        let hook = Hook::parse(raw)?;
        let (endpoint, method) = hook.route()?;

        if let Some(addr) = hook.listen_addr()? {
            self.start(addr)?;
        }

        self.register(&endpoint, method.clone(), source).await;
        Ok(ActiveRoute {
            endpoint,
            method,
            source: source.to_string(),
        })
    }

    /// 等待停止信号后注销路由
    ///
    /// 发送端被丢弃同样视为停止。
    pub async fn serve_until(&self, route: ActiveRoute, stop: oneshot::Receiver<()>) {
        let _ = stop.await;
        info!("配置 {} 停止", route.source);
        self.deregister(&route.endpoint, &route.method, &route.source)
            .await;
    }

    /// 运行一个网关配置直到收到停止信号
    pub async fn run_configuration(
        self: &Arc<Self>,
        source: &str,
        raw: &str,
        stop: oneshot::Receiver<()>,
    ) -> Result<()> {
        let route = self.activate(source, raw).await?;
        info!("配置 {} 运行中", source);
        self.serve_until(route, stop).await;
        Ok(())
    }
}
