//! gRPC server implementation.

use std::net::SocketAddr;
use tonic::transport::Server;
use tracing::{error, info};

use super::proto::ratekeeper::v1::rate_limit_service_server::RateLimitServiceServer;
use super::service::RateLimitServiceImpl;
use crate::error::{RatekeeperError, Result};

/// gRPC server for the rate limit service.
pub struct GrpcServer {
    /// Address to bind to
    addr: SocketAddr,
    service: RateLimitServiceImpl,
}

impl GrpcServer {
    pub fn new(addr: SocketAddr, service: RateLimitServiceImpl) -> Self {
        Self { addr, service }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Start the gRPC server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send,
    {
        info!(
            addr = %self.addr,
            "Starting gRPC server for RateLimitService"
        );

        Server::builder()
            .add_service(RateLimitServiceServer::new(self.service))
            .serve_with_shutdown(self.addr, signal)
            .await
            .map_err(|e| {
                error!(error = %e, "gRPC server failed");
                RatekeeperError::Grpc(e)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FailurePolicy;
    use crate::limiter::{LimiterOptions, Quota, RateLimiter};
    use crate::store::MemoryStore;
    use std::sync::Arc;
    use std::time::Duration;

    fn test_service() -> RateLimitServiceImpl {
        let limiter = RateLimiter::new(Arc::new(MemoryStore::new()), LimiterOptions::default());
        RateLimitServiceImpl::new(
            Arc::new(limiter),
            Quota::per_second(10).unwrap(),
            FailurePolicy::FailClosed,
        )
    }

    #[test]
    fn test_server_creation() {
        let addr: SocketAddr = "127.0.0.1:8081".parse().unwrap();
        let server = GrpcServer::new(addr, test_service());
        assert_eq!(server.addr(), addr);
    }

    #[tokio::test]
    async fn test_server_stops_on_signal() {
        let addr: SocketAddr = "127.0.0.1:18961".parse().unwrap();
        let server = GrpcServer::new(addr, test_service());

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            server.serve_with_shutdown(tokio::time::sleep(Duration::from_millis(50))),
        )
        .await;

        assert!(matches!(result, Ok(Ok(()))));
    }
}
