//! gRPC host layer for the rate limiter.

mod server;
mod service;

pub use server::GrpcServer;
pub use service::RateLimitServiceImpl;

// Include the generated protobuf code
pub mod proto {
    pub mod ratekeeper {
        pub mod v1 {
            tonic::include_proto!("ratekeeper.v1");
        }
    }
}

// Re-export commonly used types
pub use proto::ratekeeper::v1::{
    rate_limit_service_server::RateLimitServiceServer, CheckRequest, CheckResponse,
    ClearAllRequest, ClearAllResponse, Verdict,
};
