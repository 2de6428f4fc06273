// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Multi-subscriber event broadcasting.
//!
//! [`Broadcaster`] is a barrier, not a fire-and-forget queue: [`Broadcaster::dispatch`]
//! returns only after every subscriber registered at the time of the call has
//! received the value through [`Subscription::recv`]. A subscriber that stops
//! reading therefore stalls every later dispatch on the same broadcaster.
//! Dropping a [`Subscription`] releases any dispatch waiting on it.
//!
//! ```ignore
//! let status = Broadcaster::<Status>::new();
//! let mut sub = status.subscribe().await;
//!
//! tokio::spawn(async move {
//!     while let Some(status) = sub.recv().await {
//!         println!("status: {status}");
//!     }
//! });
//!
//! status.dispatch(Status::Running).await;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::Stream;
use futures::future::join_all;
use tokio::sync::{RwLock, mpsc, oneshot};

/// A value paired with the acknowledgement the receiver sends back.
type Delivery<T> = (T, oneshot::Sender<()>);

struct Subscriber<T> {
    id: u64,
    tx: mpsc::Sender<Delivery<T>>,
}

struct Members<T> {
    subscribers: Vec<Subscriber<T>>,
    closed: bool,
}

struct Registry<T> {
    members: RwLock<Members<T>>,
}

/// Subscription ids are unique across all broadcasters.
static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(0);

/// Publishes values to a dynamic set of subscribers.
///
/// Cloning a broadcaster yields another handle to the same subscriber set.
pub struct Broadcaster<T> {
    registry: Arc<Registry<T>>,
}

impl<T> Clone for Broadcaster<T> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Default for Broadcaster<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> Broadcaster<T> {
    /// Create a broadcaster with no subscribers.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry {
                members: RwLock::new(Members {
                    subscribers: Vec::new(),
                    closed: false,
                }),
            }),
        }
    }

    /// Register a new subscriber.
    ///
    /// The subscription only sees values dispatched after this call returns.
    /// Once the broadcaster is closed the subscription is born ended.
    pub async fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::channel(1);
        let id = NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed);

        let mut members = self.registry.members.write().await;
        if !members.closed {
            members.subscribers.push(Subscriber { id, tx });
        }

        Subscription { id, rx }
    }

    /// Remove and close a subscription. Unknown subscriptions are ignored.
    pub async fn unsubscribe(&self, subscription: Subscription<T>) {
        self.registry
            .members
            .write()
            .await
            .subscribers
            .retain(|s| s.id != subscription.id);
    }

    /// Deliver `value` to every current subscriber and wait until all of them
    /// have received it. Returns how many subscribers received it.
    ///
    /// Delivery runs against the membership captured when the call starts;
    /// subscriptions added while it is in flight do not see this value.
    pub async fn dispatch(&self, value: T) -> usize {
        let targets: Vec<mpsc::Sender<Delivery<T>>> = {
            let members = self.registry.members.read().await;
            members.subscribers.iter().map(|s| s.tx.clone()).collect()
        };

        if targets.is_empty() {
            return 0;
        }

        let deliveries = targets.into_iter().map(|tx| {
            let value = value.clone();
            async move {
                let (ack_tx, ack_rx) = oneshot::channel();
                if tx.send((value, ack_tx)).await.is_err() {
                    return false;
                }
                ack_rx.await.is_ok()
            }
        });

        let delivered = join_all(deliveries).await;
        let received = delivered.iter().filter(|ok| **ok).count();

        // Subscriptions dropped without unsubscribe are pruned lazily.
        if received < delivered.len() {
            self.registry
                .members
                .write()
                .await
                .subscribers
                .retain(|s| !s.tx.is_closed());
        }

        received
    }

    /// Close every subscription and clear the registry.
    ///
    /// Later dispatches find no subscribers and return immediately, and later
    /// subscriptions end without yielding a value.
    pub async fn close(&self) {
        let mut members = self.registry.members.write().await;
        members.closed = true;
        members.subscribers.clear();
    }

    /// Number of registered subscribers.
    pub async fn subscriber_count(&self) -> usize {
        self.registry.members.read().await.subscribers.len()
    }
}

/// Receiving end of a [`Broadcaster`] subscription.
pub struct Subscription<T> {
    id: u64,
    rx: mpsc::Receiver<Delivery<T>>,
}

impl<T> Subscription<T> {
    /// Wait for the next value.
    ///
    /// Returns `None` once the subscription was removed or the broadcaster
    /// closed.
    pub async fn recv(&mut self) -> Option<T> {
        let (value, ack) = self.rx.recv().await?;
        let _ = ack.send(());
        Some(value)
    }

    /// Convert the subscription into a stream of values.
    pub fn into_stream(self) -> impl Stream<Item = T> + Send
    where
        T: Send,
    {
        futures::stream::unfold(self, |mut sub| async move {
            let value = sub.recv().await?;
            Some((value, sub))
        })
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
