//! Ratewarden - In-process sliding-window rate limiting
//!
//! This crate tracks recent request timestamps per client key (a user id or
//! the peer IP address) and rejects requests once a key exceeds its quota
//! within a sliding time window. The limiter is exposed through axum
//! middleware and a small administrative HTTP API.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
