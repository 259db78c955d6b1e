//! Dicoweb - web front-end and dictionary modules for DICT servers
//!
//! The library holds three cooperating pieces:
//! - an async DICT (RFC 2229) client and the cached web UI built on it,
//! - `dicod`, a small DICT server hosting pluggable dictionary modules,
//! - the modules themselves: a flat-file dictionary and a MediaWiki adapter.

pub mod config;
pub mod core;
pub mod models;
pub mod modules;
pub mod routes;
pub mod server;
pub mod services;
pub mod telemetry;

// Re-export commonly used types
pub use config::Settings;
pub use modules::{DictionaryModule, ModuleContext, ModuleResult};
pub use services::{CacheManager, DictClient, DictError};
