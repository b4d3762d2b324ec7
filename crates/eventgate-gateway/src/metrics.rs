//! 指标收集与导出模块
//!
//! 记录网关收到的请求、派发的事件以及配置重载次数，
//! 并通过 Prometheus 文本格式导出。

use hyper::{Body, Method, Request, Response, StatusCode};
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;

use eventgate_common::{Error, Result};

use crate::server::{serve, text_response};

/// 网关指标
pub struct GatewayMetrics {
    /// Prometheus 注册表
    registry: Registry,
    /// 被接受的请求数
    pub requests_accepted: IntCounter,
    /// 被拒绝的请求数（路由未命中或请求体读取失败）
    pub requests_rejected: IntCounter,
    /// 成功派发的事件数
    pub events_dispatched: IntCounter,
    /// 派发失败的事件数
    pub dispatch_failures: IntCounter,
    /// 成功应用的配置重载次数
    pub config_reloads: IntCounter,
    /// 被拒绝的配置重载次数
    pub config_reload_failures: IntCounter,
    /// 当前运行的网关配置数
    pub active_configurations: IntGauge,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter> {
    let counter = IntCounter::new(name, help).map_err(|e| Error::Metrics(e.to_string()))?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| Error::Metrics(e.to_string()))?;
    Ok(counter)
}

impl GatewayMetrics {
    /// 创建并注册全部指标
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let active_configurations = IntGauge::new(
            "eventgate_active_configurations",
            "Number of running gateway configurations",
        )
        .map_err(|e| Error::Metrics(e.to_string()))?;
        registry
            .register(Box::new(active_configurations.clone()))
            .map_err(|e| Error::Metrics(e.to_string()))?;

        Ok(Self {
            requests_accepted: counter(
                &registry,
                "eventgate_requests_accepted_total",
                "Total number of webhook requests accepted",
            )?,
            requests_rejected: counter(
                &registry,
                "eventgate_requests_rejected_total",
                "Total number of webhook requests rejected",
            )?,
            events_dispatched: counter(
                &registry,
                "eventgate_events_dispatched_total",
                "Total number of events dispatched",
            )?,
            dispatch_failures: counter(
                &registry,
                "eventgate_dispatch_failures_total",
                "Total number of failed event dispatches",
            )?,
            config_reloads: counter(
                &registry,
                "eventgate_config_reloads_total",
                "Total number of configuration reloads applied",
            )?,
            config_reload_failures: counter(
                &registry,
                "eventgate_config_reload_failures_total",
                "Total number of configuration reloads rejected",
            )?,
            active_configurations,
            registry,
        })
    }

    /// 以 Prometheus 文本格式编码当前指标
    pub fn encode(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| Error::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| Error::Metrics(e.to_string()))
    }

    async fn handle(&self, req: Request<Body>) -> Response<Body> {
        if req.method() != Method::GET || req.uri().path() != "/metrics" {
            return text_response(StatusCode::NOT_FOUND, "Not Found");
        }
        match self.encode() {
            Ok(body) => text_response(StatusCode::OK, body),
            Err(e) => text_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        }
    }

    /// 启动 /metrics 端点
    pub fn start_metrics_server(self: &Arc<Self>, addr: SocketAddr) -> Result<SocketAddr> {
        let metrics = self.clone();
        serve("指标", addr, move |req| {
            let metrics = metrics.clone();
            async move { metrics.handle(req).await }
        })
    }
}
