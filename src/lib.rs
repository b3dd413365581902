pub mod api;
pub mod config;
pub mod downloader;
pub mod history;

pub use config::{ConfigError, RelayConfig, ResolverConfig};
