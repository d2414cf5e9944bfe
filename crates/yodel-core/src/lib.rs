//! Shared plumbing for Yodel processes: tracing, env loading, health probes
//! and HTTP middleware.

pub mod config;
pub mod health;
pub mod middleware;
pub mod tracing;
