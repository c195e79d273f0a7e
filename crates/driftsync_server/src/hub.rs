//! Real-time change-notification fan-out.
//!
//! The hub is the one genuinely concurrent component: many producer
//! threads call [`SubscriptionHub::notify_change`] while consumer tasks
//! drain per-subscription queues. Queues are bounded and drop the
//! oldest pending event when full, so a slow consumer never stalls the
//! publisher or other subscribers. Sync correctness does not depend on
//! delivery; notification is best-effort by design.

use chrono::{DateTime, Duration, Utc};
use driftsync_protocol::{capture_timestamp, JsonMap, StreamEvent, SyncLogEntry};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};
use uuid::Uuid;

/// A bounded, drop-oldest event queue shared between the hub and one
/// subscriber.
pub struct DeliveryQueue {
    events: Mutex<VecDeque<StreamEvent>>,
    capacity: usize,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl DeliveryQueue {
    fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    fn push(&self, event: StreamEvent) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }

        let mut events = self.events.lock();
        if events.len() == self.capacity {
            events.pop_front();
            self.dropped.fetch_add(1, Ordering::SeqCst);
        }
        events.push_back(event);
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.events.lock().clear();
    }

    /// Removes and returns the oldest pending event.
    pub fn pop(&self) -> Option<StreamEvent> {
        self.events.lock().pop_front()
    }

    /// Removes and returns all pending events in delivery order.
    pub fn drain(&self) -> Vec<StreamEvent> {
        self.events.lock().drain(..).collect()
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns true if no events are pending.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Number of events dropped to make room for newer ones.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }

    /// Returns true once the subscription has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// The consumer end of a subscription.
///
/// Dropping the handle closes the queue; the hub's next sweep removes
/// the subscription.
pub struct SubscriptionHandle {
    id: Uuid,
    queue: Arc<DeliveryQueue>,
}

impl SubscriptionHandle {
    /// The subscription id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The underlying delivery queue.
    pub fn queue(&self) -> &DeliveryQueue {
        &self.queue
    }

    /// Removes and returns the oldest pending event.
    pub fn pop(&self) -> Option<StreamEvent> {
        self.queue.pop()
    }

    /// Removes and returns all pending events in delivery order.
    pub fn drain(&self) -> Vec<StreamEvent> {
        self.queue.drain()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.queue.close();
    }
}

struct Subscription {
    table_name: Option<String>,
    pk_filter: Option<JsonMap>,
    expires_at: Option<DateTime<Utc>>,
    last_activity: Mutex<DateTime<Utc>>,
    queue: Arc<DeliveryQueue>,
}

impl Subscription {
    fn matches(&self, entry: &SyncLogEntry) -> bool {
        if let Some(table) = &self.table_name {
            if !table.eq_ignore_ascii_case(&entry.table_name) {
                return false;
            }
        }

        if let Some(filter) = &self.pk_filter {
            for (key, value) in filter {
                if entry.pk_value.get(key) != Some(value) {
                    return false;
                }
            }
        }

        true
    }
}

/// Routes newly applied/pushed change entries to matching subscribers.
pub struct SubscriptionHub {
    subscriptions: RwLock<HashMap<Uuid, Subscription>>,
    queue_capacity: usize,
    idle_ttl: Duration,
}

impl SubscriptionHub {
    /// Creates a hub whose queues hold `queue_capacity` events and
    /// whose subscriptions are swept after `idle_ttl` without activity.
    pub fn new(queue_capacity: usize, idle_ttl: Duration) -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            queue_capacity,
            idle_ttl,
        }
    }

    /// Registers a subscription and returns its delivery handle.
    ///
    /// `table_name` of `None` is a wildcard matching every table; the
    /// optional `pk_filter` restricts delivery to entries whose
    /// `pk_value` contains every filter field with an equal value. The
    /// first event on the queue is `Connected` with the subscription
    /// id.
    pub fn subscribe(
        &self,
        id: Uuid,
        table_name: Option<&str>,
        pk_filter: Option<JsonMap>,
        expires_at: Option<DateTime<Utc>>,
    ) -> SubscriptionHandle {
        let queue = Arc::new(DeliveryQueue::new(self.queue_capacity));
        queue.push(StreamEvent::Connected { subscription_id: id });

        let subscription = Subscription {
            table_name: table_name.map(|t| t.to_string()),
            pk_filter,
            expires_at,
            last_activity: Mutex::new(capture_timestamp()),
            queue: Arc::clone(&queue),
        };

        self.subscriptions.write().insert(id, subscription);
        debug!(%id, table = ?table_name, "subscription created");
        SubscriptionHandle { id, queue }
    }

    /// Removes a subscription and closes its queue. Idempotent.
    pub fn unsubscribe(&self, id: Uuid) {
        if let Some(subscription) = self.subscriptions.write().remove(&id) {
            subscription.queue.close();
            debug!(%id, "subscription removed");
        }
    }

    /// Delivers an entry to every matching live subscription.
    ///
    /// Table names match case-insensitively; table-level subscriptions
    /// (no record filter) match every entry in the table, deletes
    /// included. Delivery never blocks: full queues drop their oldest
    /// pending event.
    pub fn notify_change(&self, entry: &SyncLogEntry) {
        let now = capture_timestamp();
        let subscriptions = self.subscriptions.read();

        for (id, subscription) in subscriptions.iter() {
            if subscription.queue.is_closed() || !subscription.matches(entry) {
                continue;
            }

            subscription.queue.push(StreamEvent::Change(entry.clone()));
            *subscription.last_activity.lock() = now;
            trace!(subscription = %id, entry = %entry.describe(), "change delivered");
        }
    }

    /// Removes closed, expired, and idle subscriptions.
    ///
    /// Returns the number removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut subscriptions = self.subscriptions.write();
        let before = subscriptions.len();

        subscriptions.retain(|id, subscription| {
            if subscription.queue.is_closed() {
                debug!(%id, "sweeping closed subscription");
                return false;
            }
            if subscription.expires_at.is_some_and(|at| at <= now) {
                debug!(%id, "sweeping expired subscription");
                subscription.queue.close();
                return false;
            }
            if now - *subscription.last_activity.lock() > self.idle_ttl {
                debug!(%id, "sweeping idle subscription");
                subscription.queue.close();
                return false;
            }
            true
        });

        before - subscriptions.len()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.read().len()
    }
}
