//! Node module
//!
//! - `GatewayConfig`: TOML-loadable configuration
//! - `Gateway` / `RunningGateway`: create, start and stop one instance
//! - `ServiceHandle`: shutdown channel and task tracking
//! - `run_cli`: the `wa-gateway` binary entry point

pub mod cli;
pub mod config;
pub mod gateway;
pub mod service_handle;

pub use cli::run_cli;
pub use config::GatewayConfig;
pub use gateway::{Gateway, RunningGateway};
pub use service_handle::ServiceHandle;
