//! Name -> handler table for the client surface.
//!
//! Built once at startup from what the client declares through
//! `RegistryBuilder`; immutable afterwards and shared behind an `Arc`.

use crate::client::descriptor::{is_listener_name, MethodDescriptor, MethodDocs};
use crate::client::AutomationClient;
use crate::utils::{GatewayError, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

pub type MethodFuture = BoxFuture<'static, anyhow::Result<Value>>;
pub type ActionFn = Arc<dyn Fn(Vec<Value>) -> MethodFuture + Send + Sync>;
/// Re-emits one listener emission to whoever registered it. Returns `false`
/// once the receiving side is gone, after which the client may drop it.
pub type Relay = Arc<dyn Fn(Value) -> bool + Send + Sync>;
pub type ListenerFn = Arc<dyn Fn(Relay, Vec<Value>) -> MethodFuture + Send + Sync>;

#[derive(Clone)]
pub enum Handler {
    /// One-shot call, resolves to its result.
    Action(ActionFn),
    /// Attaches `Relay` to the client; resolves to the registration's return value.
    Listener(ListenerFn),
}

#[derive(Clone)]
pub struct MethodRecord {
    pub descriptor: MethodDescriptor,
    pub docs: MethodDocs,
    pub handler: Handler,
}

pub struct MethodRegistry {
    order: Vec<String>,
    records: HashMap<String, MethodRecord>,
}

impl MethodRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Enumerate `client`'s declared surface.
    pub fn from_client<C: AutomationClient>(client: Arc<C>) -> Result<Self> {
        let mut b = RegistryBuilder::default();
        client.register_methods(&mut b);
        b.build()
    }

    pub fn get(&self, name: &str) -> Option<&MethodRecord> {
        self.records.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    /// Descriptors in registration order.
    pub fn descriptors(&self) -> Vec<MethodDescriptor> {
        self.records().map(|r| r.descriptor.clone()).collect()
    }

    pub fn records(&self) -> impl Iterator<Item = &MethodRecord> {
        self.order.iter().filter_map(|n| self.records.get(n))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    entries: Vec<MethodRecord>,
    docs: HashMap<String, MethodDocs>,
}

impl RegistryBuilder {
    /// Declare a one-shot method.
    pub fn action<F, Fut>(&mut self, name: &str, params: &[&str], f: F) -> &mut Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let handler: ActionFn = Arc::new(move |args| f(args).boxed());
        self.push(name, params, Handler::Action(handler))
    }

    /// Declare a listener registration. The name must carry the listener prefix.
    pub fn listener<F, Fut>(&mut self, name: &str, params: &[&str], f: F) -> &mut Self
    where
        F: Fn(Relay, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let handler: ListenerFn = Arc::new(move |relay, args| f(relay, args).boxed());
        self.push(name, params, Handler::Listener(handler))
    }

    pub fn document(&mut self, name: &str, docs: MethodDocs) -> &mut Self {
        self.docs.insert(name.to_string(), docs);
        self
    }

    fn push(&mut self, name: &str, params: &[&str], handler: Handler) -> &mut Self {
        self.entries.push(MethodRecord {
            descriptor: MethodDescriptor::new(name, params.iter().copied()),
            docs: MethodDocs::default(),
            handler,
        });
        self
    }

    pub fn build(mut self) -> Result<MethodRegistry> {
        let mut order = Vec::with_capacity(self.entries.len());
        let mut records = HashMap::with_capacity(self.entries.len());
        for mut rec in self.entries {
            let name = rec.descriptor.name.clone();
            if name.trim().is_empty() {
                return Err(GatewayError::Descriptor("method name must not be empty".into()));
            }
            let mut seen = HashSet::new();
            if let Some(dup) = rec.descriptor.parameter_names.iter().find(|p| !seen.insert(p.as_str())) {
                return Err(GatewayError::Descriptor(format!("{}: parameter {} declared twice", name, dup)));
            }
            match (&rec.handler, is_listener_name(&name)) {
                (Handler::Action(_), true) => {
                    return Err(GatewayError::Descriptor(format!("{} looks like a listener but is declared as an action", name)))
                }
                (Handler::Listener(_), false) => {
                    return Err(GatewayError::Descriptor(format!("listener {} must start with \"on\"", name)))
                }
                _ => {}
            }
            if let Some(docs) = self.docs.remove(&name) {
                rec.docs = docs;
            }
            if records.insert(name.clone(), rec).is_some() {
                return Err(GatewayError::Descriptor(format!("duplicate method {}", name)));
            }
            order.push(name);
        }
        if let Some(orphan) = self.docs.keys().next() {
            return Err(GatewayError::Descriptor(format!("docs given for unknown method {}", orphan)));
        }
        Ok(MethodRegistry { order, records })
    }
}
