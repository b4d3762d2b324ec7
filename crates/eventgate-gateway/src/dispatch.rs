//! 事件派发
//!
//! 网关处理器把收到的原始负载交给派发器。生产环境派发到同一 Pod 内的
//! 转换器，测试和嵌入场景可以使用通道派发器直接观察负载。

use async_trait::async_trait;
use hyper::body::Bytes;
use hyper::client::HttpConnector;
use hyper::{Body, Client, Request, Uri};
use tokio::sync::mpsc;
use tracing::debug;

use eventgate_common::{Error, Result, HEADER_EVENT_SOURCE};

/// 事件派发器
#[async_trait]
pub trait EventDispatcher: Send + Sync {
    /// 派发一条原始负载，`source` 为产生该负载的网关配置
    async fn dispatch(&self, payload: Bytes, source: &str) -> Result<()>;
}

/// 通过 HTTP POST 派发到转换器
pub struct HttpDispatcher {
    client: Client<HttpConnector>,
    endpoint: Uri,
}

impl HttpDispatcher {
    /// 派发到任意 URL
    pub fn new(url: &str) -> Result<Self> {
        let endpoint = url
            .parse::<Uri>()
            .map_err(|e| Error::Config(format!("无效的派发地址 {url}: {e}")))?;
        Ok(Self {
            client: Client::new(),
            endpoint,
        })
    }

    /// 派发到本 Pod 内监听在 `port` 的转换器
    pub fn for_transformer(port: u16) -> Result<Self> {
        Self::new(&format!("http://localhost:{port}/"))
    }

    pub fn endpoint(&self) -> &Uri {
        &self.endpoint
    }
}

#[async_trait]
impl EventDispatcher for HttpDispatcher {
    async fn dispatch(&self, payload: Bytes, source: &str) -> Result<()> {
        let request = Request::post(self.endpoint.clone())
            .header(HEADER_EVENT_SOURCE, source)
            .body(Body::from(payload))
            .map_err(|e| Error::Dispatch(e.to_string()))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| Error::Network(format!("派发到 {} 失败: {e}", self.endpoint)))?;

        if !response.status().is_success() {
            return Err(Error::Dispatch(format!(
                "{} 返回状态 {}",
                self.endpoint,
                response.status()
            )));
        }

        debug!("负载已派发到 {}，来源: {}", self.endpoint, source);
        Ok(())
    }
}

/// 派发出去的负载
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchedEvent {
    pub source: String,
    pub payload: Bytes,
}

/// 派发到进程内通道
pub struct ChannelDispatcher {
    tx: mpsc::UnboundedSender<DispatchedEvent>,
}

impl ChannelDispatcher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DispatchedEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventDispatcher for ChannelDispatcher {
    async fn dispatch(&self, payload: Bytes, source: &str) -> Result<()> {
        self.tx
            .send(DispatchedEvent {
                source: source.to_string(),
                payload,
            })
            .map_err(|_| Error::Dispatch("接收端已关闭".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transformer_endpoint() {
        let dispatcher = HttpDispatcher::for_transformer(9300).unwrap();
        assert_eq!(dispatcher.endpoint().to_string(), "http://localhost:9300/");
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(HttpDispatcher::new("http://bad host/"), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_channel_dispatcher() {
        let (dispatcher, mut rx) = ChannelDispatcher::new();
        dispatcher
            .dispatch(Bytes::from_static(b"{\"ref\":\"main\"}"), "github")
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.source, "github");
        assert_eq!(event.payload, Bytes::from_static(b"{\"ref\":\"main\"}"));

        drop(rx);
        assert!(dispatcher.dispatch(Bytes::new(), "github").await.is_err());
    }
}
