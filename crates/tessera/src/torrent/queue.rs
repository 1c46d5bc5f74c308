//! Queue of pieces shared by all the workers of a download.
use std::{
    collections::VecDeque,
    sync::atomic::{AtomicBool, Ordering},
};

use tokio::sync::{Mutex, Notify};

use crate::piece::PieceWork;

/// A FIFO of [`PieceWork`] that many workers pop from and push back to.
///
/// Popping waits while the queue is empty, a failed piece pushed back by
/// another worker wakes one waiter. Once closed, every pending and future
/// pop returns `None` and pushes are dropped.
#[derive(Debug, Default)]
pub struct WorkQueue {
    queue: Mutex<VecDeque<PieceWork>>,
    notify: Notify,
    closed: AtomicBool,
}

impl WorkQueue {
    pub fn new(works: impl IntoIterator<Item = PieceWork>) -> Self {
        Self {
            queue: Mutex::new(works.into_iter().collect()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Take the next piece, waiting until one is available or the queue is
    /// closed.
    pub async fn pop(&self) -> Option<PieceWork> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // register before checking, so a push in between is not missed.
            notified.as_mut().enable();

            if self.is_closed() {
                return None;
            }

            if let Some(work) = self.queue.lock().await.pop_front() {
                return Some(work);
            }

            notified.await;
        }
    }

    /// Put a piece at the tail of the queue.
    pub async fn push(&self, work: PieceWork) {
        if self.is_closed() {
            return;
        }
        self.queue.lock().await.push_back(work);
        self.notify.notify_one();
    }

    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Wake up every waiting worker and make them stop.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
