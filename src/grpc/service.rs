//! Rate limit service implementation.

use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::{debug, info, instrument, warn};

use super::proto::ratekeeper::v1::{
    self as pb, rate_limit_service_server::RateLimitService, CheckRequest, CheckResponse,
    ClearAllRequest, ClearAllResponse, Verdict,
};

use crate::config::FailurePolicy;
use crate::identity::RequestMetadata;
use crate::limiter::{Decision, DenyPayload, Quota, RateLimiter};

/// Implementation of the `ratekeeper.v1.RateLimitService` gRPC interface.
///
/// This is where store outages are turned into a response, according to the
/// configured [`FailurePolicy`].
pub struct RateLimitServiceImpl {
    /// The rate limiter instance
    rate_limiter: Arc<RateLimiter>,
    /// Quota applied when a request carries no override
    default_quota: Quota,
    failure_policy: FailurePolicy,
}

impl RateLimitServiceImpl {
    pub fn new(
        rate_limiter: Arc<RateLimiter>,
        default_quota: Quota,
        failure_policy: FailurePolicy,
    ) -> Self {
        Self {
            rate_limiter,
            default_quota,
            failure_policy,
        }
    }
}

fn metadata_from_request(req: &CheckRequest) -> RequestMetadata {
    let opt = |s: &str| (!s.is_empty()).then(|| s.to_string());
    RequestMetadata {
        client_ip: opt(&req.client_ip),
        forwarded_for: opt(&req.forwarded_for),
        remote_addr: opt(&req.remote_addr),
    }
}

fn deny_to_proto(payload: &DenyPayload) -> pb::DenyPayload {
    pb::DenyPayload {
        status: payload.status.clone(),
        message: payload.message.clone(),
        additional_info: Some(pb::AdditionalInfo {
            identifier: payload.additional_info.identifier.clone(),
            last_request_at: payload.additional_info.last_request_at.clone(),
            request_count: payload.additional_info.request_count,
            domain: payload.additional_info.domain.clone(),
        }),
    }
}

#[tonic::async_trait]
impl RateLimitService for RateLimitServiceImpl {
    /// Count one request for the resolved caller and decide whether it may proceed.
    #[instrument(
        skip(self, request),
        fields(
            max_requests = request.get_ref().max_requests,
            window_seconds = request.get_ref().window_seconds
        )
    )]
    async fn check_and_record(
        &self,
        request: Request<CheckRequest>,
    ) -> Result<Response<CheckResponse>, Status> {
        let req = request.into_inner();

        let identifier = match metadata_from_request(&req).resolve_identifier() {
            Some(identifier) => identifier,
            None => {
                warn!("Received rate limit request without any caller address");
                return Err(Status::invalid_argument(
                    "no caller address could be resolved",
                ));
            }
        };

        let quota = self
            .default_quota
            .with_overrides(req.max_requests, req.window_seconds);

        debug!(
            identifier = %identifier,
            max_requests = quota.max_requests(),
            window_seconds = quota.window_seconds(),
            "Processing rate limit request"
        );

        let decision = match self.rate_limiter.check_and_record(&identifier, &quota).await {
            Ok(decision) => decision,
            Err(e) => match self.failure_policy {
                FailurePolicy::FailClosed => {
                    warn!(identifier = %identifier, error = %e, "Rate limiter unavailable, rejecting");
                    return Err(Status::unavailable(e.to_string()));
                }
                FailurePolicy::FailOpen => {
                    warn!(identifier = %identifier, error = %e, "Rate limiter unavailable, allowing");
                    return Ok(Response::new(CheckResponse {
                        verdict: Verdict::Allow.into(),
                        identifier,
                        degraded: true,
                        ..Default::default()
                    }));
                }
            },
        };

        let response = match decision {
            Decision::Allow { request_count } => CheckResponse {
                verdict: Verdict::Allow.into(),
                identifier,
                request_count,
                ..Default::default()
            },
            Decision::Deny {
                payload,
                retry_after,
            } => {
                let deny_body = payload
                    .to_json()
                    .map_err(|e| Status::internal(format!("failed to encode denial: {}", e)))?;

                info!(
                    identifier = %identifier,
                    count = payload.additional_info.request_count,
                    "Request denied"
                );

                CheckResponse {
                    verdict: Verdict::Deny.into(),
                    identifier,
                    request_count: payload.additional_info.request_count,
                    deny: Some(deny_to_proto(&payload)),
                    deny_body,
                    retry_after: Some(prost_types::Duration {
                        seconds: retry_after.as_secs() as i64,
                        nanos: 0,
                    }),
                    degraded: false,
                }
            }
        };

        Ok(Response::new(response))
    }

    /// Wipe every stored rate limiting record.
    #[instrument(skip(self, _request))]
    async fn clear_all(
        &self,
        _request: Request<ClearAllRequest>,
    ) -> Result<Response<ClearAllResponse>, Status> {
        self.rate_limiter.clear_all().await.map_err(|e| {
            warn!(error = %e, "Failed to clear rate limiting records");
            Status::unavailable(e.to_string())
        })?;

        info!("All rate limiting records cleared");
        Ok(Response::new(ClearAllResponse {}))
    }
}
