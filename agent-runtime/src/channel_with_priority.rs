//! A bounded, four-class priority channel: the primitive `Mailbox` (§4.2)
//! is built on.
//!
//! This generalizes `quickwit-actors::channel_with_priority`, which offers
//! exactly two classes (an unbounded "high" queue and a bounded "low"
//! queue), to the four priority classes §3 requires (`HIGH`, `NORMAL`,
//! `LOW`, `BACKGROUND`), all bounded. With only two classes the teacher
//! resolves races by re-checking the high-priority queue by hand after a
//! `select!` on both branches resolves low-priority first; with four
//! classes that manual double-check becomes a quadratic dance, so this
//! version uses `tokio::select! { biased; ... }`, which already guarantees
//! the first ready branch in declaration order wins, the same strict
//! priority guarantee, expressed with the primitive built for it.

use flume::TryRecvError;
use thiserror::Error;

use crate::activity::Priority;

#[derive(Debug, Error)]
pub enum SendError<T> {
    #[error("the channel is closed")]
    Disconnected(T),
    #[error("the channel is full")]
    Full(T),
}

#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum RecvError {
    #[error("no message is currently available")]
    NoMessageAvailable,
    #[error("all senders were dropped and no pending messages remain")]
    Disconnected,
}

const NUM_PRIORITIES: usize = Priority::ALL.len();

/// Creates a four-class bounded priority channel. `capacity` applies to
/// every class independently. Sending `capacity` messages at `HIGH` never
/// displaces or blocks `NORMAL` sends.
pub fn bounded<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    let mut txs: Vec<flume::Sender<T>> = Vec::with_capacity(NUM_PRIORITIES);
    let mut rxs: Vec<flume::Receiver<T>> = Vec::with_capacity(NUM_PRIORITIES);
    for _ in 0..NUM_PRIORITIES {
        let (tx, rx) = flume::bounded(capacity);
        txs.push(tx);
        rxs.push(rx);
    }
    let sender = Sender {
        txs: txs.try_into().unwrap_or_else(|_| unreachable!()),
    };
    let receiver = Receiver {
        rxs: rxs.try_into().unwrap_or_else(|_| unreachable!()),
    };
    (sender, receiver)
}

pub struct Sender<T> {
    txs: [flume::Sender<T>; NUM_PRIORITIES],
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self {
            txs: self.txs.clone(),
        }
    }
}

impl<T> Sender<T> {
    pub fn try_send(&self, priority: Priority, msg: T) -> Result<(), SendError<T>> {
        self.txs[priority.index()].try_send(msg).map_err(|err| match err {
            flume::TrySendError::Full(msg) => SendError::Full(msg),
            flume::TrySendError::Disconnected(msg) => SendError::Disconnected(msg),
        })
    }

    pub async fn send_async(&self, priority: Priority, msg: T) -> Result<(), SendError<T>> {
        self.txs[priority.index()]
            .send_async(msg)
            .await
            .map_err(|flume::SendError(msg)| SendError::Disconnected(msg))
    }

    /// Number of messages currently queued, summed across all four classes.
    pub fn len(&self) -> usize {
        self.txs.iter().map(|tx| tx.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.iter().all(|tx| tx.is_empty())
    }
}

pub struct Receiver<T> {
    rxs: [flume::Receiver<T>; NUM_PRIORITIES],
}

impl<T> Receiver<T> {
    /// Scans every class in strict priority order and returns the first
    /// available message without blocking.
    pub fn try_recv(&self) -> Result<T, RecvError> {
        let mut all_disconnected = true;
        for rx in &self.rxs {
            match rx.try_recv() {
                Ok(msg) => return Ok(msg),
                Err(TryRecvError::Empty) => all_disconnected = false,
                Err(TryRecvError::Disconnected) => {}
            }
        }
        if all_disconnected {
            Err(RecvError::Disconnected)
        } else {
            Err(RecvError::NoMessageAvailable)
        }
    }

    /// Waits for the next message, dispatched in strict priority order:
    /// if `HIGH` and `NORMAL` are both non-empty at the moment a message
    /// becomes available, `HIGH` is always returned first (I-2 in §8).
    pub async fn recv(&self) -> Result<T, RecvError> {
        if let Ok(msg) = self.try_recv() {
            return Ok(msg);
        }
        let result = tokio::select! {
            biased;
            res = self.rxs[0].recv_async() => res,
            res = self.rxs[1].recv_async() => res,
            res = self.rxs[2].recv_async() => res,
            res = self.rxs[3].recv_async() => res,
        };
        match result {
            Ok(msg) => Ok(msg),
            Err(flume::RecvError::Disconnected) => {
                // A sibling class may have received a message in the small
                // window between the fast-path `try_recv` above and the
                // `select!` resolving on a now-disconnected class.
                self.try_recv()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rxs.iter().all(|rx| rx.is_empty())
    }

    pub fn len(&self) -> usize {
        self.rxs.iter().map(|rx| rx.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_strict_priority_dispatch() {
        let (tx, rx) = bounded::<u32>(8);
        tx.try_send(Priority::Low, 1).unwrap();
        tx.try_send(Priority::Normal, 2).unwrap();
        tx.try_send(Priority::High, 3).unwrap();
        tx.try_send(Priority::Background, 4).unwrap();
        assert_eq!(rx.recv().await, Ok(3));
        assert_eq!(rx.recv().await, Ok(2));
        assert_eq!(rx.recv().await, Ok(1));
        assert_eq!(rx.recv().await, Ok(4));
    }

    #[tokio::test]
    async fn test_fifo_within_a_priority() {
        let (tx, rx) = bounded::<u32>(8);
        tx.try_send(Priority::Normal, 1).unwrap();
        tx.try_send(Priority::Normal, 2).unwrap();
        tx.try_send(Priority::Normal, 3).unwrap();
        assert_eq!(rx.recv().await, Ok(1));
        assert_eq!(rx.recv().await, Ok(2));
        assert_eq!(rx.recv().await, Ok(3));
    }

    #[tokio::test]
    async fn test_full_queue_rejects_try_send() {
        let (tx, _rx) = bounded::<u32>(1);
        tx.try_send(Priority::Normal, 1).unwrap();
        assert!(matches!(
            tx.try_send(Priority::Normal, 2),
            Err(SendError::Full(2))
        ));
    }

    #[tokio::test]
    async fn test_recv_waits_for_a_message() {
        let (tx, rx) = bounded::<u32>(8);
        assert!(
            tokio::time::timeout(Duration::from_millis(30), rx.recv())
                .await
                .is_err()
        );
        tx.try_send(Priority::High, 42).unwrap();
        assert_eq!(rx.recv().await, Ok(42));
    }

    #[tokio::test]
    async fn test_per_priority_capacity_is_independent() {
        let (tx, _rx) = bounded::<u32>(1);
        tx.try_send(Priority::High, 1).unwrap();
        // HIGH is full, but NORMAL has its own capacity.
        tx.try_send(Priority::Normal, 2).unwrap();
    }
}
