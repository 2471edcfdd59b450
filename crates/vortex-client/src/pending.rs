// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pending request table: the rendezvous between the send path and the
//! receive loop.
//!
//! Every operation takes the single table lock only long enough to insert
//! or remove an entry; waiters are completed after the lock is released.

use crate::error::{Result, VortexError};
use crate::protocol::{CommandReply, CorrelationId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

type Slot = oneshot::Sender<Result<CommandReply>>;

/// Concurrent map from correlation id to a single-use completion slot.
#[derive(Debug, Default)]
pub struct PendingRequestTable {
    slots: Mutex<HashMap<CorrelationId, Slot>>,
}

impl PendingRequestTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a completion slot for `id` and return the handle to await it.
    pub fn register(&self, id: CorrelationId) -> Result<ReplyWaiter> {
        let (tx, rx) = oneshot::channel();
        let mut slots = self.slots.lock();
        if slots.contains_key(&id) {
            return Err(VortexError::DuplicateCorrelation(id));
        }
        slots.insert(id, tx);
        Ok(ReplyWaiter { id, rx })
    }

    /// Deliver `reply` to the waiter registered under `id`.
    ///
    /// Returns `false` for unknown or already resolved ids.
    pub fn resolve(&self, id: CorrelationId, reply: CommandReply) -> bool {
        let slot = self.slots.lock().remove(&id);
        match slot {
            Some(tx) => {
                // The waiter may have been dropped; the entry is gone either way.
                let _ = tx.send(Ok(reply));
                true
            }
            None => false,
        }
    }

    /// Remove `id` without completing it (local deadline expiry, send failure).
    pub fn cancel(&self, id: CorrelationId) -> bool {
        self.slots.lock().remove(&id).is_some()
    }

    /// Complete every outstanding waiter with `error`; the table is empty afterwards.
    ///
    /// Returns the number of waiters failed.
    pub fn fail_all(&self, error: VortexError) -> usize {
        let drained: Vec<Slot> = {
            let mut slots = self.slots.lock();
            slots.drain().map(|(_, tx)| tx).collect()
        };
        let count = drained.len();
        for tx in drained {
            let _ = tx.send(Err(error.clone()));
        }
        count
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    pub fn contains(&self, id: CorrelationId) -> bool {
        self.slots.lock().contains_key(&id)
    }
}

/// Awaitable handle for one registered request.
///
/// Resolves to the matching reply, or to the channel-level error passed to
/// [`PendingRequestTable::fail_all`].
#[derive(Debug)]
pub struct ReplyWaiter {
    id: CorrelationId,
    rx: oneshot::Receiver<Result<CommandReply>>,
}

impl ReplyWaiter {
    pub fn id(&self) -> CorrelationId {
        self.id
    }
}

impl Future for ReplyWaiter {
    type Output = Result<CommandReply>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // Slot dropped without an answer: the table itself went away.
            Poll::Ready(Err(_)) => Poll::Ready(Err(VortexError::ChannelClosed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::EntityKind;

    fn id(n: i64) -> CorrelationId {
        CorrelationId::new(n)
    }

    #[tokio::test]
    async fn resolve_delivers_to_matching_waiter() {
        let table = PendingRequestTable::new();
        let first = table.register(id(1)).unwrap();
        let second = table.register(id(2)).unwrap();

        assert!(table.resolve(id(2), CommandReply::ok(EntityKind::Topic, id(2), "")));
        assert!(table.resolve(id(1), CommandReply::error(EntityKind::Topic, id(1), "nope")));

        let reply = second.await.unwrap();
        assert_eq!(reply.header.correlation_id, id(2));
        let reply = first.await.unwrap();
        assert_eq!(reply.body.message, "nope");
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn second_resolve_is_not_found() {
        let table = PendingRequestTable::new();
        let waiter = table.register(id(7)).unwrap();

        assert!(table.resolve(id(7), CommandReply::ok(EntityKind::DataReader, id(7), "r")));
        assert!(!table.resolve(id(7), CommandReply::ok(EntityKind::DataReader, id(7), "again")));

        assert_eq!(waiter.await.unwrap().body.entity_id, "r");
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let table = PendingRequestTable::new();
        let _waiter = table.register(id(3)).unwrap();
        let err = table.register(id(3)).unwrap_err();
        assert!(matches!(err, VortexError::DuplicateCorrelation(dup) if dup == id(3)));
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn fail_all_empties_and_fails_each_waiter_once() {
        let table = PendingRequestTable::new();
        let waiters: Vec<_> = (1..=5).map(|n| table.register(id(n)).unwrap()).collect();

        assert_eq!(table.fail_all(VortexError::ChannelClosed), 5);
        assert!(table.is_empty());
        assert_eq!(table.fail_all(VortexError::ChannelClosed), 0);

        for waiter in waiters {
            assert!(matches!(waiter.await, Err(VortexError::ChannelClosed)));
        }
    }

    #[test]
    fn cancel_removes_entry_so_late_reply_is_unknown() {
        let table = PendingRequestTable::new();
        let waiter = table.register(id(4)).unwrap();
        assert!(table.cancel(id(4)));
        assert!(!table.cancel(id(4)));
        assert!(!table.resolve(id(4), CommandReply::ok(EntityKind::Topic, id(4), "")));
        drop(waiter);
    }

    #[test]
    fn resolve_after_waiter_dropped_still_clears_entry() {
        let table = PendingRequestTable::new();
        drop(table.register(id(8)).unwrap());
        assert!(table.resolve(id(8), CommandReply::ok(EntityKind::Topic, id(8), "")));
        assert!(!table.contains(id(8)));
    }

    #[tokio::test]
    async fn concurrent_register_resolve_and_fail_all() {
        use std::sync::Arc;

        let table = Arc::new(PendingRequestTable::new());
        let mut tasks = Vec::new();
        for n in 1..=64 {
            let table = Arc::clone(&table);
            tasks.push(tokio::spawn(async move {
                let waiter = table.register(id(n)).unwrap();
                if n % 2 == 0 {
                    table.resolve(id(n), CommandReply::ok(EntityKind::Topic, id(n), ""));
                }
                waiter
            }));
        }
        let mut waiters = Vec::new();
        for task in tasks {
            waiters.push(task.await.unwrap());
        }
        table.fail_all(VortexError::ChannelClosed);
        assert!(table.is_empty());

        for waiter in waiters {
            let n = waiter.id().value();
            match waiter.await {
                Ok(reply) => {
                    assert_eq!(n % 2, 0);
                    assert_eq!(reply.header.correlation_id.value(), n);
                }
                Err(err) => {
                    assert_eq!(n % 2, 1);
                    assert!(matches!(err, VortexError::ChannelClosed));
                }
            }
        }
    }
}
