//! Handler registry and event fan-out.
//!
//! Handlers run synchronously on the task that processes transport events.
//! A handler that needs to talk to the service should clone its
//! `ShadowClient` and spawn the request.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ds_protocol::{EventKind, ShadowEvent};

/// Callback invoked with every matching event.
pub type Handler = Arc<dyn Fn(&ShadowEvent) + Send + Sync>;

/// Which events a handler receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventFilter {
    /// Every event.
    Any,
    /// One kind. `Kind(EventKind::Error)` matches the whole error family.
    Kind(EventKind),
}

impl EventFilter {
    pub fn matches(self, kind: EventKind) -> bool {
        match self {
            Self::Any => true,
            Self::Kind(EventKind::Error) => kind.is_error(),
            Self::Kind(wanted) => wanted == kind,
        }
    }
}

impl From<EventKind> for EventFilter {
    fn from(kind: EventKind) -> Self {
        Self::Kind(kind)
    }
}

/// Token returned by [`Dispatcher::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct Registration {
    id: HandlerId,
    filter: EventFilter,
    handler: Handler,
}

#[derive(Default)]
pub struct Dispatcher {
    next_id: AtomicU64,
    registrations: Mutex<Vec<Registration>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, filter: impl Into<EventFilter>, handler: F) -> HandlerId
    where
        F: Fn(&ShadowEvent) + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let filter = filter.into();
        self.lock().push(Registration {
            id,
            filter,
            handler: Arc::new(handler),
        });
        tracing::debug!(?filter, ?id, "shadow handler registered");
        id
    }

    /// Remove a handler. Returns `false` if `id` was not registered.
    pub fn unregister(&self, id: HandlerId) -> bool {
        let mut registrations = self.lock();
        let before = registrations.len();
        registrations.retain(|r| r.id != id);
        registrations.len() != before
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to every matching handler and return how many ran.
    ///
    /// Kind-specific handlers run first, then wildcard handlers, each group
    /// in registration order. The registry lock is released before any
    /// handler runs, so handlers may register or unregister freely.
    pub fn dispatch(&self, event: &ShadowEvent) -> usize {
        let handlers = self.matching(event.kind);
        for (id, handler) in &handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                tracing::error!(kind = %event.kind, handler = ?id, "shadow handler panicked");
            }
        }
        handlers.len()
    }

    fn matching(&self, kind: EventKind) -> Vec<(HandlerId, Handler)> {
        let registrations = self.lock();
        let specific = registrations
            .iter()
            .filter(|r| r.filter != EventFilter::Any && r.filter.matches(kind));
        let wildcard = registrations
            .iter()
            .filter(|r| r.filter == EventFilter::Any);
        specific
            .chain(wildcard)
            .map(|r| (r.id, Arc::clone(&r.handler)))
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Registration>> {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
