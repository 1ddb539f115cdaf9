//! Host APIs.
//!
//! - [`http`] - HTTP client with tracing, cookie session and domain allowlist

pub mod http;
