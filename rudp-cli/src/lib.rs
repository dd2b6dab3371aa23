//! Reliable UDP CLI Library
//!
//! Shared functionality for the reliable UDP command-line tools: the
//! HTTP-style request/response layer, configuration files, common flags and
//! session statistics.

pub mod cli;
pub mod config;
pub mod http;
pub mod stats;

pub use cli::{init_logging, CommonArgs};
pub use config::{ClientConfig, Config, ConfigError, EngineKind, ProxyConfig, ServerConfig};
pub use http::{respond, HttpError, Request, Response};
pub use stats::{format_bytes, summarize};
