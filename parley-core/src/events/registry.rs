//! Observer registry for inbound events
//!
//! Maps each [`EventName`] to an ordered list of listeners. Registration
//! returns a [`Subscription`] that can remove exactly that listener later.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use super::types::{EventName, InboundEvent};

/// A callback invoked for every event of the name it was registered under
pub type Listener = Arc<dyn Fn(&InboundEvent) + Send + Sync>;

/// Identifies one registration inside a registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    listeners: HashMap<EventName, Vec<(ListenerId, Listener)>>,
}

fn lock(inner: &Mutex<RegistryInner>) -> MutexGuard<'_, RegistryInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared, cloneable listener registry
///
/// Clones refer to the same underlying registry. Listeners are invoked in
/// registration order, outside the registry lock, so a listener may register
/// or remove listeners while being dispatched.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for `name`.
    pub fn on<F>(&self, name: EventName, listener: F) -> Subscription
    where
        F: Fn(&InboundEvent) + Send + Sync + 'static,
    {
        self.on_shared(name, Arc::new(listener))
    }

    /// Register an already shared listener for `name`.
    ///
    /// Registering the same listener twice yields two registrations.
    pub fn on_shared(&self, name: EventName, listener: Listener) -> Subscription {
        let mut inner = lock(&self.inner);
        inner.next_id += 1;
        let id = ListenerId(inner.next_id);
        inner
            .listeners
            .entry(name)
            .or_default()
            .push((id, listener));

        Subscription {
            registry: Arc::downgrade(&self.inner),
            event: name,
            id,
        }
    }

    /// Remove one registration. Returns whether it was present.
    pub fn off(&self, name: EventName, id: ListenerId) -> bool {
        remove(&self.inner, name, id)
    }

    /// Remove every listener for `name`. Returns how many were removed.
    pub fn remove_all_listeners(&self, name: EventName) -> usize {
        lock(&self.inner)
            .listeners
            .remove(&name)
            .map_or(0, |list| list.len())
    }

    /// Remove every listener for every event.
    pub fn clear(&self) {
        lock(&self.inner).listeners.clear();
    }

    pub fn listener_count(&self, name: EventName) -> usize {
        lock(&self.inner).listeners.get(&name).map_or(0, Vec::len)
    }

    /// Deliver `event` to its listeners. Returns how many were invoked.
    pub fn dispatch(&self, event: &InboundEvent) -> usize {
        self.dispatch_while(event, || true)
    }

    /// Deliver `event` while `live` holds.
    ///
    /// `live` is checked before every listener, so a registry cleared from
    /// another thread mid-dispatch stops calling its old listeners.
    pub fn dispatch_while(&self, event: &InboundEvent, live: impl Fn() -> bool) -> usize {
        let snapshot: Vec<Listener> = lock(&self.inner)
            .listeners
            .get(&event.name())
            .map(|list| list.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default();

        let mut invoked = 0;
        for listener in &snapshot {
            if !live() {
                break;
            }
            listener(event);
            invoked += 1;
        }
        invoked
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = lock(&self.inner);
        let counts: HashMap<EventName, usize> = inner
            .listeners
            .iter()
            .map(|(name, list)| (*name, list.len()))
            .collect();
        f.debug_struct("ListenerRegistry")
            .field("listeners", &counts)
            .finish()
    }
}

fn remove(inner: &Mutex<RegistryInner>, name: EventName, id: ListenerId) -> bool {
    let mut inner = lock(inner);
    let Some(list) = inner.listeners.get_mut(&name) else {
        return false;
    };
    let before = list.len();
    list.retain(|(existing, _)| *existing != id);
    let removed = list.len() != before;
    if list.is_empty() {
        inner.listeners.remove(&name);
    }
    removed
}

/// Disposer for a single registration
///
/// Dropping a subscription does not unregister; call
/// [`unsubscribe`](Subscription::unsubscribe). The subscription only holds a
/// weak reference, so it never keeps a closed transport's registry alive.
#[derive(Debug)]
pub struct Subscription {
    registry: Weak<Mutex<RegistryInner>>,
    event: EventName,
    id: ListenerId,
}

impl Subscription {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn event(&self) -> EventName {
        self.event
    }

    /// Remove the registration. Returns false if it was already gone.
    pub fn unsubscribe(self) -> bool {
        match self.registry.upgrade() {
            Some(inner) => remove(&inner, self.event, self.id),
            None => false,
        }
    }
}
