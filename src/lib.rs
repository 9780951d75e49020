//! wa-gateway
//!
//! Fronts a stateful automation client with:
//! - an event bus with wildcard namespaces and webhook fan-out (`events`, `webhook`)
//! - a remote-invocation gateway over HTTP and WebSocket (`rpc`)
//! - API contract generation and an explorer (`docs`), plus request stats (`stats`)
//!
//! The client is consumed only through the method table it declares
//! (`client::AutomationClient`); `node::Gateway` wires everything together.

pub mod client;
pub mod docs;
pub mod events;
pub mod node;
pub mod rpc;
pub mod stats;
pub mod utils;
pub mod webhook;

pub use client::{AutomationClient, EchoClient, MethodRegistry, RegistryBuilder};
pub use events::{Event, EventBus};
pub use node::{Gateway, GatewayConfig, RunningGateway};
pub use utils::{GatewayError, Result};
