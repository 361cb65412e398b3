#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Publish/subscribe channel carrying combat-domain events.
//!
//! Subscribers register per [`EventKind`] and are invoked in subscription
//! order. The registry is guarded by a mutex only long enough to take a
//! snapshot of the matching subscribers, so producers on several threads
//! can publish while others subscribe, unsubscribe or deliver. Handlers may
//! publish follow-up events from inside a delivery.
//!
//! The bus never owns its subscribers. Each entry carries a liveness flag
//! flipped by its [`Subscription`] handle and, for owned subscriptions, a
//! weak reference to the owner; stale entries are pruned silently at the
//! next publish.

use std::{
    any::Any,
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, Weak,
    },
};

use tracing::{debug, error, trace};
use wave_defence_core::{lock_unpoisoned, Event, EventKind};

type Handler = Box<dyn Fn(&Event) + Send + Sync>;
type OwnerProbe = Box<dyn Fn() -> bool + Send + Sync>;

/// Identifier allocated to a subscription by the bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

/// Counters describing a single publish.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Handlers that ran to completion.
    pub delivered: usize,
    /// Handlers that panicked; their failure was logged and isolated.
    pub failed: usize,
    /// Stale subscribers dropped instead of invoked.
    pub pruned: usize,
}

/// Cloneable handle to a shared event bus.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.live_subscribers())
            .finish()
    }
}

impl EventBus {
    /// Creates a bus without subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a non-owning handle, used by handlers that publish follow-up
    /// events without keeping the bus alive.
    #[must_use]
    pub fn downgrade(&self) -> WeakEventBus {
        WeakEventBus {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Registers `handler` for events of `kind`.
    ///
    /// The handler stays registered while the returned [`Subscription`] is
    /// alive.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.insert(kind, Box::new(handler), None)
    }

    /// Registers `handler` on behalf of `owner`.
    ///
    /// Only a weak reference to the owner is kept. Once the owner is dropped
    /// the entry is treated as stale even if the subscription handle is
    /// still around.
    pub fn subscribe_owned<T, F>(&self, kind: EventKind, owner: &Arc<T>, handler: F) -> Subscription
    where
        T: Send + Sync + 'static,
        F: Fn(&T, &Event) + Send + Sync + 'static,
    {
        let delivery_owner = Arc::downgrade(owner);
        let probe_owner = Arc::downgrade(owner);
        self.insert(
            kind,
            Box::new(move |event| {
                if let Some(owner) = delivery_owner.upgrade() {
                    handler(&owner, event);
                }
            }),
            Some(Box::new(move || probe_owner.strong_count() > 0)),
        )
    }

    /// Removes a subscription eagerly.
    pub fn unsubscribe(&self, subscription: Subscription) {
        subscription.revoke();
        let mut entries = lock_unpoisoned(&self.inner.entries);
        entries.retain(|entry| entry.id != subscription.id);
    }

    /// Publishes `event` to every live subscriber of its kind.
    pub fn publish(&self, event: Event) {
        let _ = self.deliver(event);
    }

    /// Publishes `event` and reports what happened to each subscriber.
    pub fn deliver(&self, event: Event) -> DeliveryReport {
        let kind = event.kind();
        let mut report = DeliveryReport::default();

        let targets: Vec<Arc<Entry>> = {
            let mut entries = lock_unpoisoned(&self.inner.entries);
            let before = entries.len();
            entries.retain(|entry| entry.is_live());
            report.pruned = before - entries.len();
            entries
                .iter()
                .filter(|entry| entry.kind == kind)
                .cloned()
                .collect()
        };

        trace!(?kind, subscribers = targets.len(), "publishing event");

        for entry in targets {
            // Revocation may race with delivery; honour it up to the last moment.
            if !entry.is_live() {
                report.pruned += 1;
                continue;
            }

            match catch_unwind(AssertUnwindSafe(|| (entry.handler)(&event))) {
                Ok(()) => report.delivered += 1,
                Err(payload) => {
                    report.failed += 1;
                    error!(
                        ?kind,
                        subscription = entry.id.get(),
                        reason = panic_message(payload.as_ref()),
                        "event handler panicked"
                    );
                }
            }
        }

        report
    }

    /// Number of registered subscribers that are still live.
    #[must_use]
    pub fn live_subscribers(&self) -> usize {
        lock_unpoisoned(&self.inner.entries)
            .iter()
            .filter(|entry| entry.is_live())
            .count()
    }

    fn insert(&self, kind: EventKind, handler: Handler, owner: Option<OwnerProbe>) -> Subscription {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let active = Arc::new(AtomicBool::new(true));
        let entry = Arc::new(Entry {
            id,
            kind,
            active: Arc::clone(&active),
            owner,
            handler,
        });

        lock_unpoisoned(&self.inner.entries).push(entry);
        debug!(?kind, subscription = id.get(), "subscribed");

        Subscription { id, kind, active }
    }
}

/// Non-owning handle to an [`EventBus`].
#[derive(Clone, Debug, Default)]
pub struct WeakEventBus {
    inner: Weak<BusInner>,
}

impl WeakEventBus {
    /// Recovers a strong handle if the bus is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<EventBus> {
        self.inner.upgrade().map(|inner| EventBus { inner })
    }

    /// Publishes through the bus, dropping the event if the bus is gone.
    pub fn publish(&self, event: Event) {
        match self.upgrade() {
            Some(bus) => bus.publish(event),
            None => debug!(kind = ?event.kind(), "bus dropped; event discarded"),
        }
    }

    /// Publishes every event in order.
    pub fn publish_all(&self, events: impl IntoIterator<Item = Event>) {
        for event in events {
            self.publish(event);
        }
    }
}

/// Handle keeping a subscriber registered.
///
/// Dropping the handle revokes the subscription; the bus notices at the
/// next publish and discards the entry without invoking it.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    kind: EventKind,
    active: Arc<AtomicBool>,
}

impl Subscription {
    /// Identifier allocated by the bus.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Event kind the subscription listens to.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    /// Marks the subscriber as gone.
    pub fn revoke(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Reports whether the subscription has not been revoked.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.revoke();
    }
}

#[derive(Default)]
struct BusInner {
    entries: Mutex<Vec<Arc<Entry>>>,
    next_id: AtomicU64,
}

struct Entry {
    id: SubscriptionId,
    kind: EventKind,
    active: Arc<AtomicBool>,
    owner: Option<OwnerProbe>,
    handler: Handler,
}

impl Entry {
    fn is_live(&self) -> bool {
        self.active.load(Ordering::Acquire) && self.owner.as_ref().map_or(true, |probe| probe())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
