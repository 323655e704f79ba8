use futures::future::BoxFuture;
use futures::stream::{self, Stream, StreamExt};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::mpsc;

use super::Result;
use crate::device::Link;

/// Notification source standing in for the meter.
///
/// Delivers the given chunks in order and then stays silent like a meter
/// that was switched off, without ending the stream.
pub(crate) fn fake_notifications(chunks: Vec<Vec<u8>>) -> impl Stream<Item = Vec<u8>> {
    stream::iter(chunks).chain(stream::pending())
}

/// Delivers the given chunks and then ends, like a dropped connection.
pub(crate) fn closing_notifications(chunks: Vec<Vec<u8>>) -> impl Stream<Item = Vec<u8>> {
    stream::iter(chunks)
}

/// Connection standing in for the BLE peripheral, reporting every
/// teardown call on a channel.
pub(crate) struct FakeLink {
    connected: AtomicBool,
    pub(crate) fail_unsubscribe: bool,
    disconnect_failures: AtomicUsize,
    events: mpsc::UnboundedSender<&'static str>,
}

impl FakeLink {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<&'static str>) {
        let (events, rx) = mpsc::unbounded_channel();
        let link = Self {
            connected: AtomicBool::new(true),
            fail_unsubscribe: false,
            disconnect_failures: AtomicUsize::new(0),
            events,
        };
        (link, rx)
    }

    pub(crate) fn fail_next_disconnect(&self) {
        self.disconnect_failures.fetch_add(1, Ordering::SeqCst);
    }

    fn record(&self, event: &'static str) {
        let _ = self.events.send(event);
    }
}

impl Link for FakeLink {
    fn is_connected(&self) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move { Ok(self.connected.load(Ordering::SeqCst)) })
    }

    fn unsubscribe(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.record("unsubscribe");
            if self.fail_unsubscribe {
                Err(io::Error::new(io::ErrorKind::Other, "unsubscribe failed").into())
            } else {
                Ok(())
            }
        })
    }

    fn disconnect(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.record("disconnect");
            let pending_failure = self
                .disconnect_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if pending_failure {
                Err(io::Error::new(io::ErrorKind::Other, "disconnect failed").into())
            } else {
                self.connected.store(false, Ordering::SeqCst);
                Ok(())
            }
        })
    }
}
