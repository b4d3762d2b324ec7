//! HTTP 服务器启动
//!
//! Webhook 路由、转换器和指标端点共用同一套 hyper 服务器装配方式。

use hyper::body::{Bytes, HttpBody};
use hyper::{
    service::{make_service_fn, service_fn},
    Body, Request, Response, Server, StatusCode,
};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use tracing::{error, info};

use eventgate_common::{Error, Result};

/// 绑定地址并在后台任务中提供服务
///
/// 绑定失败立即返回错误；成功时返回实际监听地址（端口为 0 时由系统分配）。
pub fn serve<H, Fut>(name: &'static str, addr: SocketAddr, handler: H) -> Result<SocketAddr>
where
    H: Fn(Request<Body>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Response<Body>> + Send + 'static,
{
    let builder = Server::try_bind(&addr)
        .map_err(|e| Error::Network(format!("{name} 服务器无法绑定 {addr}: {e}")))?;

    let make_svc = make_service_fn(move |_| {
        let handler = handler.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let response = handler(req);
                async move { Ok::<_, Infallible>(response.await) }
            }))
        }
    });

    let server = builder.serve(make_svc);
    let local_addr = server.local_addr();
    info!("{} 服务器启动在 {}", name, local_addr);

    tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("{} 服务器错误: {}", name, e);
        }
    });

    Ok(local_addr)
}

/// 单个请求体的大小上限
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// 读取请求体，超过 `limit` 字节时立即放弃
///
/// 声明了长度的请求在读取前拒绝；分块传输的请求在累计超限时拒绝。
pub async fn read_body(mut body: Body, limit: usize) -> Result<Bytes> {
    if body.size_hint().lower() > limit as u64 {
        return Err(Error::Network(format!("请求体超过 {limit} 字节")));
    }

    let mut collected = Vec::new();
    while let Some(chunk) = body.data().await {
        let chunk = chunk.map_err(|e| Error::Network(format!("读取请求体失败: {e}")))?;
        if collected.len() + chunk.len() > limit {
            return Err(Error::Network(format!("请求体超过 {limit} 字节")));
        }
        collected.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(collected))
}

/// 以纯文本构造响应
pub fn text_response(status: StatusCode, body: impl Into<Body>) -> Response<Body> {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_body_within_limit() {
        let body = read_body(Body::from("{\"ref\":\"main\"}"), 64).await.unwrap();
        assert_eq!(body, Bytes::from_static(b"{\"ref\":\"main\"}"));
    }

    #[tokio::test]
    async fn test_declared_length_over_limit() {
        let body = Body::from(vec![0u8; 65]);
        assert!(matches!(read_body(body, 64).await, Err(Error::Network(_))));
    }

    #[tokio::test]
    async fn test_chunked_body_over_limit() {
        let (mut sender, body) = Body::channel();
        tokio::spawn(async move {
            for _ in 0..4 {
                if sender.send_data(Bytes::from(vec![1u8; 32])).await.is_err() {
                    break;
                }
            }
        });

        assert!(matches!(read_body(body, 64).await, Err(Error::Network(_))));
    }
}
