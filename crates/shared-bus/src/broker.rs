//! # In-Memory Broker
//!
//! A single-process broker with the queue semantics the RPC bridge relies on:
//!
//! - Named durable queues, declared explicitly and idempotently.
//! - Competing consumers served round-robin, each bounded by its prefetch.
//! - Explicit ack/nack; nacked-with-requeue and orphaned messages go back to
//!   the head of the queue flagged `redelivered`.
//! - Publishing to an undeclared queue drops the message, like the default
//!   exchange with no matching binding.
//! - An offline switch that severs every connection, cancels every consumer
//!   and discards transient messages, so reconnect paths can be exercised.
//!
//! Suitable for single-node operation and tests; a networked deployment
//! would implement [`MessageChannel`] over its broker client instead.

use crate::channel::{Connector, MessageChannel};
use crate::error::TransportError;
use crate::subscriber::{Acker, Consumer, Delivery};
use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{DeliveryMode, Envelope};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Broker handle. Cheap to clone; all clones share the same queues.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<BrokerInner>,
}

#[derive(Default)]
struct BrokerInner {
    state: Mutex<BrokerState>,
    published: AtomicU64,
    dropped: AtomicU64,
}

struct BrokerState {
    online: bool,
    /// Bumped every time the broker goes offline; channels from an older
    /// epoch are dead.
    epoch: u64,
    next_tag: u64,
    next_consumer: u64,
    queues: HashMap<String, QueueState>,
}

impl Default for BrokerState {
    fn default() -> Self {
        Self {
            online: true,
            epoch: 0,
            next_tag: 1,
            next_consumer: 1,
            queues: HashMap::new(),
        }
    }
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<Queued>,
    consumers: Vec<ConsumerSlot>,
    cursor: usize,
    unacked: HashMap<u64, Unacked>,
}

struct Queued {
    envelope: Envelope,
    redelivered: bool,
}

struct Unacked {
    consumer_id: u64,
    envelope: Envelope,
}

struct ConsumerSlot {
    id: u64,
    prefetch: u16,
    in_flight: usize,
    sender: mpsc::UnboundedSender<Delivery>,
}

impl ConsumerSlot {
    fn has_capacity(&self) -> bool {
        self.prefetch == 0 || self.in_flight < usize::from(self.prefetch)
    }
}

impl InMemoryBroker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a channel on the current connection epoch.
    pub fn open_channel(&self) -> Result<Arc<dyn MessageChannel>, TransportError> {
        let state = self.inner.state.lock();
        if !state.online {
            return Err(TransportError::Unreachable("broker offline".into()));
        }
        Ok(Arc::new(BrokerChannel {
            broker: self.clone(),
            epoch: state.epoch,
        }))
    }

    /// A [`Connector`] opening channels on this broker.
    #[must_use]
    pub fn connector(&self) -> InMemoryConnector {
        InMemoryConnector {
            broker: self.clone(),
        }
    }

    /// Take the broker down or bring it back.
    ///
    /// Going offline severs every open channel and cancels every consumer.
    /// Unacked messages return to their queues; transient messages are lost.
    pub fn set_online(&self, online: bool) {
        let mut state = self.inner.state.lock();
        if state.online == online {
            return;
        }
        state.online = online;
        if online {
            info!("Broker back online");
            return;
        }

        state.epoch += 1;
        for (name, queue) in state.queues.iter_mut() {
            queue.consumers.clear();
            queue.cursor = 0;
            let mut orphaned: Vec<(u64, Unacked)> = queue.unacked.drain().collect();
            orphaned.sort_by_key(|(tag, _)| *tag);
            for (_, unacked) in orphaned.into_iter().rev() {
                queue.ready.push_front(Queued {
                    envelope: unacked.envelope,
                    redelivered: true,
                });
            }
            let before = queue.ready.len();
            queue
                .ready
                .retain(|m| m.envelope.delivery_mode == DeliveryMode::Persistent);
            let lost = before - queue.ready.len();
            if lost > 0 {
                warn!(queue = %name, lost, "Transient messages lost");
            }
        }
        warn!(epoch = state.epoch, "Broker offline; all connections severed");
    }

    pub fn is_online(&self) -> bool {
        self.inner.state.lock().online
    }

    pub fn queue_exists(&self, queue: &str) -> bool {
        self.inner.state.lock().queues.contains_key(queue)
    }

    /// Messages waiting for a consumer.
    pub fn queue_depth(&self, queue: &str) -> usize {
        self.inner
            .state
            .lock()
            .queues
            .get(queue)
            .map_or(0, |q| q.ready.len())
    }

    /// Messages delivered but not yet settled.
    pub fn unacked_count(&self, queue: &str) -> usize {
        self.inner
            .state
            .lock()
            .queues
            .get(queue)
            .map_or(0, |q| q.unacked.len())
    }

    pub fn consumer_count(&self, queue: &str) -> usize {
        self.inner
            .state
            .lock()
            .queues
            .get(queue)
            .map_or(0, |q| q.consumers.len())
    }

    /// Total messages accepted for routing.
    pub fn published(&self) -> u64 {
        self.inner.published.load(Ordering::Relaxed)
    }

    /// Total messages dropped as unroutable.
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    fn check_epoch(&self, state: &BrokerState, epoch: u64) -> Result<(), TransportError> {
        if !state.online {
            return Err(TransportError::Unreachable("broker offline".into()));
        }
        if state.epoch != epoch {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    fn declare(&self, epoch: u64, queue: &str) -> Result<(), TransportError> {
        let mut state = self.inner.state.lock();
        self.check_epoch(&state, epoch)?;
        if !state.queues.contains_key(queue) {
            state.queues.insert(queue.to_string(), QueueState::default());
            debug!(queue = %queue, "Queue declared");
        }
        Ok(())
    }

    fn publish(&self, epoch: u64, queue: &str, envelope: Envelope) -> Result<(), TransportError> {
        let mut guard = self.inner.state.lock();
        self.check_epoch(&guard, epoch)?;

        let state = &mut *guard;
        let Some(target) = state.queues.get_mut(queue) else {
            self.inner.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(queue = %queue, "Unroutable message dropped (queue not declared)");
            return Ok(());
        };

        self.inner.published.fetch_add(1, Ordering::Relaxed);
        target.ready.push_back(Queued {
            envelope,
            redelivered: false,
        });
        self.pump(&mut state.next_tag, queue, target);
        Ok(())
    }

    fn consume(&self, epoch: u64, queue: &str, prefetch: u16) -> Result<Consumer, TransportError> {
        let mut guard = self.inner.state.lock();
        self.check_epoch(&guard, epoch)?;

        let state = &mut *guard;
        let id = state.next_consumer;
        let Some(target) = state.queues.get_mut(queue) else {
            return Err(TransportError::QueueNotFound(queue.to_string()));
        };
        state.next_consumer += 1;

        let (sender, receiver) = mpsc::unbounded_channel();
        target.consumers.push(ConsumerSlot {
            id,
            prefetch,
            in_flight: 0,
            sender,
        });
        debug!(queue = %queue, consumer = id, prefetch, "Consumer registered");
        self.pump(&mut state.next_tag, queue, target);

        let weak = Arc::downgrade(&self.inner);
        let name = queue.to_string();
        Ok(Consumer::new(queue, receiver, move || {
            if let Some(inner) = weak.upgrade() {
                InMemoryBroker { inner }.cancel_consumer(&name, id);
            }
        }))
    }

    fn cancel_consumer(&self, queue: &str, consumer_id: u64) {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        let Some(target) = state.queues.get_mut(queue) else {
            return;
        };
        let Some(pos) = target.consumers.iter().position(|c| c.id == consumer_id) else {
            return;
        };
        target.consumers.remove(pos);
        if target.cursor > pos {
            target.cursor -= 1;
        }
        let requeued = requeue_owned_by(target, consumer_id);
        if requeued > 0 {
            debug!(queue = %queue, consumer = consumer_id, requeued, "Unacked messages requeued");
        }
        self.pump(&mut state.next_tag, queue, target);
    }

    fn settle(
        &self,
        queue: &str,
        tag: u64,
        requeue: Option<bool>,
    ) -> Result<(), TransportError> {
        let mut guard = self.inner.state.lock();
        if !guard.online {
            return Err(TransportError::Unreachable("broker offline".into()));
        }
        let state = &mut *guard;
        let unknown = || TransportError::UnknownDeliveryTag {
            queue: queue.to_string(),
            tag,
        };
        let target = state.queues.get_mut(queue).ok_or_else(unknown)?;
        let unacked = target.unacked.remove(&tag).ok_or_else(unknown)?;

        if let Some(slot) = target
            .consumers
            .iter_mut()
            .find(|c| c.id == unacked.consumer_id)
        {
            slot.in_flight = slot.in_flight.saturating_sub(1);
        }
        if requeue == Some(true) {
            target.ready.push_front(Queued {
                envelope: unacked.envelope,
                redelivered: true,
            });
        } else if requeue == Some(false) {
            warn!(queue = %queue, tag, "Message rejected without requeue; discarded");
        }
        self.pump(&mut state.next_tag, queue, target);
        Ok(())
    }

    /// Hand ready messages to consumers with free prefetch capacity.
    fn pump(&self, next_tag: &mut u64, queue: &str, target: &mut QueueState) {
        while !target.ready.is_empty() && !target.consumers.is_empty() {
            let count = target.consumers.len();
            let start = target.cursor % count;
            let Some(offset) = (0..count)
                .find(|i| target.consumers[(start + i) % count].has_capacity())
            else {
                break;
            };
            let index = (start + offset) % count;
            target.cursor = index + 1;

            let Some(message) = target.ready.pop_front() else {
                break;
            };
            let tag = *next_tag;
            *next_tag += 1;

            let acker: Arc<dyn Acker> = Arc::new(BrokerAcker {
                inner: Arc::downgrade(&self.inner),
            });
            let delivery = Delivery::new(
                queue,
                tag,
                message.redelivered,
                message.envelope.clone(),
                acker,
            );

            let slot = &mut target.consumers[index];
            if slot.sender.send(delivery).is_err() {
                // Receiver gone without its drop hook having run yet.
                let id = slot.id;
                target.consumers.remove(index);
                target.ready.push_front(message);
                requeue_owned_by(target, id);
                continue;
            }
            slot.in_flight += 1;
            target.unacked.insert(
                tag,
                Unacked {
                    consumer_id: slot.id,
                    envelope: message.envelope,
                },
            );
        }
    }
}

/// Move every unacked message of one consumer back to the queue head.
fn requeue_owned_by(target: &mut QueueState, consumer_id: u64) -> usize {
    let mut tags: Vec<u64> = target
        .unacked
        .iter()
        .filter(|(_, u)| u.consumer_id == consumer_id)
        .map(|(tag, _)| *tag)
        .collect();
    tags.sort_unstable();
    let count = tags.len();
    for tag in tags.into_iter().rev() {
        if let Some(unacked) = target.unacked.remove(&tag) {
            target.ready.push_front(Queued {
                envelope: unacked.envelope,
                redelivered: true,
            });
        }
    }
    count
}

struct BrokerChannel {
    broker: InMemoryBroker,
    epoch: u64,
}

#[async_trait]
impl MessageChannel for BrokerChannel {
    async fn declare_queue(&self, queue: &str) -> Result<(), TransportError> {
        self.broker.declare(self.epoch, queue)
    }

    async fn publish(&self, queue: &str, envelope: Envelope) -> Result<(), TransportError> {
        self.broker.publish(self.epoch, queue, envelope)
    }

    async fn consume(&self, queue: &str, prefetch: u16) -> Result<Consumer, TransportError> {
        self.broker.consume(self.epoch, queue, prefetch)
    }

    fn is_open(&self) -> bool {
        let state = self.broker.inner.state.lock();
        state.online && state.epoch == self.epoch
    }
}

/// Holds the broker weakly so buffered deliveries never keep it alive.
struct BrokerAcker {
    inner: Weak<BrokerInner>,
}

impl BrokerAcker {
    fn broker(&self) -> Result<InMemoryBroker, TransportError> {
        self.inner
            .upgrade()
            .map(|inner| InMemoryBroker { inner })
            .ok_or(TransportError::Closed)
    }
}

#[async_trait]
impl Acker for BrokerAcker {
    async fn ack(&self, queue: &str, delivery_tag: u64) -> Result<(), TransportError> {
        self.broker()?.settle(queue, delivery_tag, None)
    }

    async fn nack(
        &self,
        queue: &str,
        delivery_tag: u64,
        requeue: bool,
    ) -> Result<(), TransportError> {
        self.broker()?.settle(queue, delivery_tag, Some(requeue))
    }
}

/// Connector for an [`InMemoryBroker`].
#[derive(Clone)]
pub struct InMemoryConnector {
    broker: InMemoryBroker,
}

#[async_trait]
impl Connector for InMemoryConnector {
    async fn connect(&self) -> Result<Arc<dyn MessageChannel>, TransportError> {
        self.broker.open_channel()
    }
}
