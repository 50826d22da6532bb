//! HTTP server implementation.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::{router, AppState};
use crate::error::{RatewardenError, Result};
use crate::ratelimit::RateLimiterBackend;

/// HTTP server exposing the rate limited routes and the admin API.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Shared handler state
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server backed by the given rate limiter.
    pub fn new(
        addr: SocketAddr,
        rate_limiter: Arc<dyn RateLimiterBackend>,
        body_limit: usize,
    ) -> Self {
        Self {
            addr,
            state: AppState::new(rate_limiter, body_limit),
        }
    }

    /// Bind the configured address and serve until `signal` resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            RatewardenError::Io(e)
        })?;

        self.serve_listener(listener, signal).await
    }

    /// Serve on an already bound listener until `signal` resolves.
    pub async fn serve_listener<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "Starting HTTP server with graceful shutdown");

        let app = router(self.state).into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                RatewardenError::Io(e)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{LimitRule, LimiterStore};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    #[test]
    fn test_server_creation() {
        let addr: SocketAddr = "127.0.0.1:3000".parse().unwrap();
        let rate_limiter = Arc::new(LimiterStore::default());
        let _server = HttpServer::new(addr, rate_limiter, 1024);
    }

    #[tokio::test]
    async fn test_serves_requests_and_shuts_down() {
        let store = Arc::new(LimiterStore::new(LimitRule::new(5, 60_000).unwrap()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = HttpServer::new(addr, store.clone(), 1024);
        let task = tokio::spawn(server.serve_listener(listener, async move {
            let _ = shutdown_rx.await;
        }));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();

        assert!(raw.starts_with("HTTP/1.1 200"), "unexpected response: {raw}");
        assert!(raw.contains("x-ratelimit-key: ip:127.0.0.1"), "missing key header: {raw}");
        assert!(raw.contains("x-ratelimit-remaining: 4"), "missing remaining header: {raw}");
        assert_eq!(store.len(), 1);

        shutdown_tx.send(()).unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();

        let server = HttpServer::new(addr, Arc::new(LimiterStore::default()), 1024);
        let result = server.serve_with_shutdown(async {}).await;
        assert!(matches!(result, Err(RatewardenError::Io(_))));
    }
}
