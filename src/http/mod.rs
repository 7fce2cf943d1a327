//! HTTP client layer: `ApiClient` with centralized rate-limit detection.

pub mod client;

pub use client::{ApiClient, DEFAULT_TIMEOUT};
