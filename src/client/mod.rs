//! Client module
//!
//! The automation client is consumed only through its declared method table:
//! it enumerates its callables into a `RegistryBuilder` and the gateway never
//! reflects over it.

pub mod descriptor;
pub mod echo;
pub mod registry;

pub use descriptor::{MethodDescriptor, MethodDocs, LISTENER_PREFIX};
pub use echo::EchoClient;
pub use registry::{Handler, MethodRecord, MethodRegistry, RegistryBuilder, Relay};

use std::sync::Arc;

/// A stateful client whose callables can be exposed by the gateway.
pub trait AutomationClient: Send + Sync + 'static {
    /// Session the client drives; namespaces generated artifacts and events.
    fn session_id(&self) -> &str;

    /// Declare every exposed method. Called once at startup.
    fn register_methods(self: Arc<Self>, methods: &mut RegistryBuilder);
}
