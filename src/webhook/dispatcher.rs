//! Bridges bus events to external HTTP sinks.
//!
//! - unrestricted sinks share one `**` subscription and are fanned out from it
//! - every filtered sink owns a `**` subscription checked against its prefixes
//! - `sessionData*` namespaces are dropped for every sink unless sensitive
//!   delivery is allowed (single switch for the whole dispatcher)
//! - delivery is one attempt per sink, failures are logged and forgotten

use crate::events::{Event, EventBus, SubscriptionId};
use crate::utils::Result;
use crate::webhook::registration::WebhookRegistration;
use crate::webhook::sender::{WebhookBody, WebhookSender};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Namespaces carrying session credentials.
pub const SENSITIVE_PREFIX: &str = "sessionData";

/// True for `sessionData`, `sessionDataBase64` and anything below them.
pub fn is_sensitive(namespace: &str) -> bool {
    namespace.split('.').next().is_some_and(|head| head.starts_with(SENSITIVE_PREFIX))
}

#[derive(Clone)]
struct Sink {
    id: u64,
    reg: Arc<WebhookRegistration>,
}

struct Inner {
    bus: EventBus,
    sender: Arc<dyn WebhookSender>,
    allow_sensitive: AtomicBool,
    sinks: RwLock<Vec<Sink>>,
    unrestricted: Arc<RwLock<Vec<Sink>>>,
    all_sub: Mutex<Option<SubscriptionId>>,
    next_id: AtomicU64,
}

#[derive(Clone)]
pub struct WebhookDispatcher {
    inner: Arc<Inner>,
}

impl WebhookDispatcher {
    pub fn new(bus: EventBus, sender: Arc<dyn WebhookSender>, allow_sensitive: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                bus,
                sender,
                allow_sensitive: AtomicBool::new(allow_sensitive),
                sinks: RwLock::new(Vec::new()),
                unrestricted: Arc::new(RwLock::new(Vec::new())),
                all_sub: Mutex::new(None),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn allow_sensitive(&self) -> bool {
        self.inner.allow_sensitive.load(Ordering::SeqCst)
    }

    pub fn set_allow_sensitive(&self, allow: bool) {
        self.inner.allow_sensitive.store(allow, Ordering::SeqCst);
    }

    /// Register every entry of `regs`, stopping at the first invalid one.
    pub fn attach(&self, regs: impl IntoIterator<Item = WebhookRegistration>) -> Result<Vec<u64>> {
        regs.into_iter().map(|r| self.register(r)).collect()
    }

    /// Add a sink. Registrations are additive; there is no removal.
    pub fn register(&self, reg: WebhookRegistration) -> Result<u64> {
        reg.validate()?;
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let sink = Sink { id, reg: Arc::new(reg) };
        self.inner.sinks.write().push(sink.clone());

        if sink.reg.events.is_all() {
            self.inner.unrestricted.write().push(sink.clone());
            self.ensure_all_subscription();
        } else {
            let dispatcher = self.clone();
            let filtered = sink.clone();
            self.inner.bus.subscribe("**", move |ev: Event| {
                let dispatcher = dispatcher.clone();
                let sink = filtered.clone();
                async move {
                    if sink.reg.events.accepts(&ev.namespace) && dispatcher.permitted(&ev) {
                        dispatcher.deliver(sink, &ev);
                    }
                    Ok::<(), anyhow::Error>(())
                }
            });
        }
        info!("webhook #{} registered: {} ({:?})", id, sink.reg.url, sink.reg.events);
        Ok(id)
    }

    pub fn registrations(&self) -> Vec<(u64, WebhookRegistration)> {
        self.inner.sinks.read().iter().map(|s| (s.id, (*s.reg).clone())).collect()
    }

    fn ensure_all_subscription(&self) {
        let mut slot = self.inner.all_sub.lock();
        if slot.is_some() {
            return;
        }
        let dispatcher = self.clone();
        let sinks = self.inner.unrestricted.clone();
        let id = self.inner.bus.subscribe("**", move |ev: Event| {
            let dispatcher = dispatcher.clone();
            let sinks = sinks.clone();
            async move {
                if dispatcher.permitted(&ev) {
                    let targets = sinks.read().clone();
                    for sink in targets {
                        dispatcher.deliver(sink, &ev);
                    }
                }
                Ok::<(), anyhow::Error>(())
            }
        });
        *slot = Some(id);
    }

    fn permitted(&self, ev: &Event) -> bool {
        if is_sensitive(&ev.namespace) && !self.allow_sensitive() {
            debug!("webhook: dropping sensitive event {}", ev.namespace);
            return false;
        }
        true
    }

    fn deliver(&self, sink: Sink, ev: &Event) {
        let sender = self.inner.sender.clone();
        let body = WebhookBody::from(ev);
        tokio::spawn(async move {
            if let Err(e) = sender.post(&sink.reg.url, &body, &sink.reg.request_config).await {
                warn!("webhook #{} delivery of {} to {} failed: {:#}", sink.id, body.namespace, sink.reg.url, e);
            }
        });
    }
}
