//! In-process publish/subscribe over dotted namespaces.
//!
//! Every matching handler runs in its own task. A failing or panicking
//! handler is logged and has no effect on the publisher or on its siblings.
//! Nothing is buffered: subscribers only see events published after they
//! registered.

use crate::events::pattern::Pattern;
use crate::events::Event;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use serde_json::Value;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

pub type EventHandler = Arc<dyn Fn(Event) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Handle returned by `subscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    pattern: Pattern,
    handler: EventHandler,
}

#[derive(Default)]
struct BusInner {
    subs: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
}

/// Cloneable handle to a bus instance.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for every namespace matching `pattern`.
    pub fn subscribe<F, Fut>(&self, pattern: impl Into<Pattern>, handler: F) -> SubscriptionId
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler: EventHandler = Arc::new(move |ev| handler(ev).boxed());
        self.subscribe_boxed(pattern.into(), handler)
    }

    pub fn subscribe_boxed(&self, pattern: Pattern, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        debug!("bus: subscribe {:?} -> {}", id, pattern);
        self.inner.subs.write().push(Subscription { id, pattern, handler });
        id
    }

    /// Remove a subscription. Returns false when the id is unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.inner.subs.write();
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subs.read().len()
    }

    /// Notify every matching subscription. Returns how many handlers were scheduled.
    ///
    /// Must be called from within a tokio runtime.
    pub fn publish(&self, namespace: &str, session_id: &str, payload: Value) -> usize {
        self.publish_event(Event::new(namespace, session_id, payload))
    }

    pub fn publish_event(&self, event: Event) -> usize {
        // snapshot under the lock, run handlers outside of it
        let targets: Vec<(SubscriptionId, EventHandler)> = self
            .inner
            .subs
            .read()
            .iter()
            .filter(|s| s.pattern.matches(&event.namespace))
            .map(|s| (s.id, s.handler.clone()))
            .collect();

        let n = targets.len();
        for (id, handler) in targets {
            let ev = event.clone();
            tokio::spawn(async move {
                let namespace = ev.namespace.clone();
                match AssertUnwindSafe(handler(ev)).catch_unwind().await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!("bus handler {:?} failed on {}: {:#}", id, namespace, e),
                    Err(_) => warn!("bus handler {:?} panicked on {}", id, namespace),
                }
            });
        }
        n
    }
}
