//! RPC module
//!
//! - HTTP catch-all at `POST /:method` (or `POST /:session/:method`)
//! - WebSocket transport at `GET /socket` with call/listen frames
//! - Static API key check shared by both transports
//!
//! Both transports resolve names through one `Dispatcher` built from the
//! method registry, so no method is wired individually.

pub mod args;
pub mod auth;
pub mod handlers;
pub mod server;
pub mod socket;

pub use auth::AuthConfig;
pub use handlers::{ApiResponse, Dispatcher, ErrorBody};
pub use server::RpcServer;
pub use socket::{ClientFrame, FrameKind, ServerFrame};
