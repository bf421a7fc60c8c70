use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// An encoded multipart chunk, shared by every viewer.
pub type Chunk = Arc<Vec<u8>>;

/// Fan-out of encoded chunks to stream viewers.
///
/// Each viewer owns a one-slot channel. `publish` never blocks: a viewer
/// whose slot is still full misses that chunk. Once closed the hub stays
/// closed; later subscriptions see `Recv::Closed` straight away.
#[derive(Clone, Default)]
pub struct FrameHub {
    inner: Arc<HubInner>,
}

#[derive(Default)]
struct HubInner {
    viewers: Mutex<Vec<(u64, SyncSender<Chunk>)>>,
    next_id: AtomicU64,
    dropped: AtomicU64,
    closed: AtomicBool,
}

pub struct Subscription {
    id: u64,
    rx: Receiver<Chunk>,
    hub: FrameHub,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Recv {
    Chunk(Chunk),
    Idle,
    Closed,
}

impl FrameHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn viewers(&self) -> MutexGuard<'_, Vec<(u64, SyncSender<Chunk>)>> {
        match self.inner.viewers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::sync_channel(1);
        let mut viewers = self.viewers();
        // checked under the lock so a concurrent close cannot miss this viewer
        if self.inner.closed.load(Ordering::SeqCst) {
            drop(tx);
            log::debug!("viewer {} refused, stream closed", id);
        } else {
            viewers.push((id, tx));
            log::debug!("viewer {} subscribed", id);
        }
        drop(viewers);
        Subscription {
            id,
            rx,
            hub: self.clone(),
        }
    }

    /// Offer `chunk` to every viewer; returns how many accepted it.
    pub fn publish(&self, chunk: Chunk) -> usize {
        let mut delivered = 0;
        self.viewers().retain(|(id, tx)| match tx.try_send(chunk.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                log::debug!("viewer {} busy, chunk dropped", id);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
        delivered
    }

    pub fn viewer_count(&self) -> usize {
        self.viewers().len()
    }

    /// Chunks skipped because a viewer had not drained its slot.
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Disconnect every viewer and refuse new ones.
    pub fn close(&self) {
        let mut viewers = self.viewers();
        self.inner.closed.store(true, Ordering::SeqCst);
        viewers.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    fn unsubscribe(&self, id: u64) {
        self.viewers().retain(|(viewer, _)| *viewer != id);
    }
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Recv {
        match self.rx.recv_timeout(timeout) {
            Ok(chunk) => Recv::Chunk(chunk),
            Err(RecvTimeoutError::Timeout) => Recv::Idle,
            Err(RecvTimeoutError::Disconnected) => Recv::Closed,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.id);
        log::debug!("viewer {} unsubscribed", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(byte: u8) -> Chunk {
        Arc::new(vec![byte])
    }

    #[test]
    fn stalled_viewer_does_not_block_publish() {
        let hub = FrameHub::new();
        let stalled = hub.subscribe();
        let active = hub.subscribe();

        assert_eq!(hub.publish(chunk(1)), 2);
        assert_eq!(active.recv_timeout(Duration::from_millis(10)), Recv::Chunk(chunk(1)));
        // stalled still holds chunk 1, so chunk 2 only reaches the active viewer
        assert_eq!(hub.publish(chunk(2)), 1);
        assert_eq!(hub.dropped(), 1);
        assert_eq!(active.recv_timeout(Duration::from_millis(10)), Recv::Chunk(chunk(2)));
        assert_eq!(stalled.recv_timeout(Duration::from_millis(10)), Recv::Chunk(chunk(1)));
    }

    #[test]
    fn dropping_subscription_removes_viewer() {
        let hub = FrameHub::new();
        let first = hub.subscribe();
        let _second = hub.subscribe();
        assert_eq!(hub.viewer_count(), 2);
        drop(first);
        assert_eq!(hub.viewer_count(), 1);
    }

    #[test]
    fn close_disconnects_viewers() {
        let hub = FrameHub::new();
        let viewer = hub.subscribe();
        hub.close();
        assert_eq!(viewer.recv_timeout(Duration::from_millis(10)), Recv::Closed);
        assert_eq!(hub.viewer_count(), 0);
    }

    #[test]
    fn subscribing_after_close_is_refused() {
        let hub = FrameHub::new();
        hub.close();
        let late = hub.subscribe();
        assert!(hub.is_closed());
        assert_eq!(hub.viewer_count(), 0);
        assert_eq!(late.recv_timeout(Duration::from_millis(10)), Recv::Closed);
        assert_eq!(hub.publish(chunk(1)), 0);
    }

    #[test]
    fn idle_when_nothing_published() {
        let hub = FrameHub::new();
        let viewer = hub.subscribe();
        assert_eq!(viewer.recv_timeout(Duration::from_millis(5)), Recv::Idle);
    }
}
