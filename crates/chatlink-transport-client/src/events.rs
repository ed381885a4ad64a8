use std::fmt;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{trace, warn};

/// Producer side of a bounded event channel.
///
/// Events are delivered on whatever task produced them; consumers that need
/// a particular thread must marshal themselves.
pub(crate) struct EventSink<E> {
    tx: mpsc::Sender<E>,
}

impl<E> Clone for EventSink<E> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<E: fmt::Debug> EventSink<E> {
    pub(crate) fn channel(capacity: usize) -> (Self, mpsc::Receiver<E>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Deliver `event`, waiting for room. Returns `false` once the receiver
    /// has been dropped.
    pub(crate) async fn emit(&self, event: E) -> bool {
        match self.tx.send(event).await {
            Ok(()) => true,
            Err(e) => {
                trace!("Event receiver dropped; discarding {:?}", e.0);
                false
            }
        }
    }

    /// Deliver without waiting. Used on teardown paths, which must not block
    /// on a slow consumer.
    pub(crate) fn try_emit(&self, event: E) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(ev)) => warn!("Event channel full; dropping {:?}", ev),
            Err(TrySendError::Closed(ev)) => trace!("Event receiver dropped; discarding {:?}", ev),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_reports_dropped_receiver() {
        let (sink, rx) = EventSink::<u8>::channel(1);
        assert!(sink.emit(1).await);
        drop(rx);
        assert!(!sink.emit(2).await);
    }

    #[tokio::test]
    async fn try_emit_drops_when_full() {
        let (sink, mut rx) = EventSink::<u8>::channel(1);
        sink.try_emit(1);
        sink.try_emit(2);
        assert_eq!(rx.recv().await, Some(1));
        assert!(rx.try_recv().is_err());
    }
}
