//! Local (in-process) links using kanal channels.

use super::{Frame, Link};
use crate::error::{Error, Result};
use std::sync::{Mutex, PoisonError};

/// One end of an in-process link.
///
/// Two kanal channels, one per direction. Useful for tests and for pipelines
/// whose "processes" are threads of the same program.
///
/// # Example
///
/// ```rust
/// use parallax_bridge::link::{ContextId, Frame, Link, LocalLink};
/// use parallax_bridge::tag::{Instance, MessageKind, Tag};
///
/// let (a, b) = LocalLink::pair();
/// let tag = Tag::encode(MessageKind::Empty, Instance::BOOTSTRAP);
/// a.send_frame(Frame::new(ContextId::ROOT, tag, b"ping")).unwrap();
///
/// let frame = b.recv_frame().unwrap();
/// assert_eq!(&frame.payload[..], b"ping");
/// ```
pub struct LocalLink {
    tx: Mutex<Option<kanal::Sender<Frame>>>,
    rx: kanal::Receiver<Frame>,
}

impl LocalLink {
    /// Create a connected pair of unbounded links.
    pub fn pair() -> (LocalLink, LocalLink) {
        let (a_tx, b_rx) = kanal::unbounded();
        let (b_tx, a_rx) = kanal::unbounded();
        (Self::from_parts(a_tx, a_rx), Self::from_parts(b_tx, b_rx))
    }

    /// Create a connected pair whose directions each hold at most `capacity`
    /// frames in flight.
    ///
    /// Senders block while the peer's queue is full, so both sides must keep
    /// receiving to avoid stalling each other.
    pub fn bounded(capacity: usize) -> (LocalLink, LocalLink) {
        let (a_tx, b_rx) = kanal::bounded(capacity);
        let (b_tx, a_rx) = kanal::bounded(capacity);
        (Self::from_parts(a_tx, a_rx), Self::from_parts(b_tx, b_rx))
    }

    fn from_parts(tx: kanal::Sender<Frame>, rx: kanal::Receiver<Frame>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
            rx,
        }
    }

    /// Number of frames waiting to be received on this end.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl Link for LocalLink {
    fn send_frame(&self, frame: Frame) -> Result<()> {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = tx.as_ref().ok_or(Error::Disconnected)?;
        tx.send(frame).map_err(|_| Error::Disconnected)
    }

    fn recv_frame(&self) -> Result<Frame> {
        self.rx.recv().map_err(|_| Error::Disconnected)
    }

    fn close(&self) -> Result<()> {
        // Dropping the sender lets the peer drain what is already queued.
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
        Ok(())
    }
}
