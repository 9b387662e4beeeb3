//! Ratekeeper - Per-Client Rate Limiting Service
//!
//! This crate identifies callers by network address, counts their requests
//! within a time window in a shared key-value store (Redis), and denies
//! callers that exceed their quota with a structured diagnostic payload.

pub mod grpc;
pub mod identity;
pub mod limiter;
pub mod config;
pub mod error;
pub mod store;
