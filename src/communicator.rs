//! Tag-matched messaging over a link.
//!
//! A [`Communicator`] is one transport context on a shared link. Receives
//! name the tag they want; frames that arrive for other tags or other
//! contexts are parked until someone asks for them. Within one context and
//! one tag, messages are delivered in the order they were sent. A probe over
//! several tags matches whichever of them arrived first.
//!
//! ```text
//!            ┌─────────────── Router ───────────────┐
//!  link ───▶ │ (context, tag) → FIFO of payloads    │ ──▶ recv_into / mprobe
//!            │ one reader at a time, others wait    │
//!            └──────────────────────────────────────┘
//! ```

use crate::error::{Error, Result};
use crate::link::{ContextId, Frame, Link, LocalLink};
use crate::tag::Tag;
use bytes::Bytes;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// Identifier of the process at the other end of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(pub u32);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer {}", self.0)
    }
}

/// Outcome of a completed receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    /// Process the message came from.
    pub source: PeerId,
    /// Tag the message was sent with.
    pub tag: Tag,
    /// Number of bytes received.
    pub len: usize,
}

/// Why the link stopped delivering frames.
#[derive(Debug, Clone)]
enum Failure {
    Disconnected,
    Other(String),
}

impl Failure {
    fn to_error(&self) -> Error {
        match self {
            Failure::Disconnected => Error::Disconnected,
            Failure::Other(msg) => Error::Protocol(msg.clone()),
        }
    }
}

struct RouterState {
    /// Parked payloads with their arrival number.
    queues: HashMap<(ContextId, Tag), VecDeque<(u64, Bytes)>>,
    arrivals: u64,
    open: HashSet<ContextId>,
    closed: HashSet<ContextId>,
    reading: bool,
    failed: Option<Failure>,
}

/// Demultiplexes one link between all of its contexts.
struct Router {
    link: Box<dyn Link>,
    peer: PeerId,
    state: Mutex<RouterState>,
    arrived: Condvar,
    next_context: AtomicU32,
}

impl Router {
    fn lock(&self) -> MutexGuard<'_, RouterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_open(state: &RouterState, context: ContextId) -> Result<()> {
        if state.open.contains(&context) {
            Ok(())
        } else {
            Err(Error::ContextClosed(context))
        }
    }

    fn send(&self, context: ContextId, tag: Tag, payload: &[u8]) -> Result<()> {
        Self::ensure_open(&self.lock(), context)?;
        self.link.send_frame(Frame::new(context, tag, payload))
    }

    /// Earliest parked arrival among `tags` in `context`.
    fn earliest(state: &RouterState, context: ContextId, tags: &[Tag]) -> Option<Tag> {
        tags.iter()
            .filter_map(|tag| {
                let (seq, _) = state.queues.get(&(context, *tag))?.front()?;
                Some((*seq, *tag))
            })
            .min_by_key(|(seq, _)| *seq)
            .map(|(_, tag)| tag)
    }

    /// Remove the next message for `context` carrying any of `tags`,
    /// reading the link as needed.
    fn take(&self, context: ContextId, tags: &[Tag]) -> Result<(Tag, Bytes)> {
        let mut state = self.lock();
        loop {
            Self::ensure_open(&state, context)?;

            if let Some(tag) = Self::earliest(&state, context, tags) {
                let key = (context, tag);
                if let Some(queue) = state.queues.get_mut(&key) {
                    if let Some((_, payload)) = queue.pop_front() {
                        if queue.is_empty() {
                            state.queues.remove(&key);
                        }
                        return Ok((tag, payload));
                    }
                }
            }

            if let Some(failure) = &state.failed {
                return Err(failure.to_error());
            }

            if state.reading {
                state = self
                    .arrived
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
                continue;
            }

            // Become the reader. The lock is released while blocked on the link.
            state.reading = true;
            drop(state);
            let result = self.link.recv_frame();
            state = self.lock();
            state.reading = false;

            match result {
                Ok(frame) => {
                    if state.closed.contains(&frame.context) {
                        tracing::trace!(
                            context = %frame.context,
                            tag = %frame.tag,
                            "discarding frame for closed context"
                        );
                    } else {
                        let seq = state.arrivals;
                        state.arrivals += 1;
                        state
                            .queues
                            .entry((frame.context, frame.tag))
                            .or_default()
                            .push_back((seq, frame.payload));
                    }
                }
                Err(Error::Disconnected) => state.failed = Some(Failure::Disconnected),
                Err(e) => state.failed = Some(Failure::Other(e.to_string())),
            }
            self.arrived.notify_all();
        }
    }

    fn open_context(&self) -> ContextId {
        let context = ContextId(self.next_context.fetch_add(1, Ordering::SeqCst));
        self.lock().open.insert(context);
        context
    }

    fn close_context(&self, context: ContextId) -> Result<()> {
        let last = {
            let mut state = self.lock();
            if !state.open.remove(&context) {
                return Err(Error::ContextClosed(context));
            }
            state.closed.insert(context);
            state.queues.retain(|(ctx, _), _| *ctx != context);
            state.open.is_empty()
        };
        self.arrived.notify_all();

        if last {
            tracing::debug!(peer = %self.peer, "last context closed, closing link");
            self.link.close()?;
        }
        Ok(())
    }

    fn parked(&self, context: ContextId) -> usize {
        self.lock()
            .queues
            .iter()
            .filter(|((ctx, _), _)| *ctx == context)
            .map(|(_, queue)| queue.len())
            .sum()
    }
}

/// One transport context bound to the peer at the other end of a link.
///
/// Communicators obtained through [`dup`](Communicator::dup) share the link
/// but never see each other's messages.
pub struct Communicator {
    router: Arc<Router>,
    context: ContextId,
}

impl Communicator {
    /// Wrap a connected link. The returned communicator owns the root context.
    pub fn new(link: impl Link + 'static, peer: PeerId) -> Self {
        let mut open = HashSet::new();
        open.insert(ContextId::ROOT);
        let router = Router {
            link: Box::new(link),
            peer,
            state: Mutex::new(RouterState {
                queues: HashMap::new(),
                arrivals: 0,
                open,
                closed: HashSet::new(),
                reading: false,
                failed: None,
            }),
            arrived: Condvar::new(),
            next_context: AtomicU32::new(ContextId::ROOT.0 + 1),
        };
        Self {
            router: Arc::new(router),
            context: ContextId::ROOT,
        }
    }

    /// Create two communicators connected by an in-process link.
    ///
    /// The first one sees the second as `PeerId(1)`, the second sees the
    /// first as `PeerId(0)`.
    pub fn local_pair() -> (Communicator, Communicator) {
        let (a, b) = LocalLink::pair();
        (
            Communicator::new(a, PeerId(1)),
            Communicator::new(b, PeerId(0)),
        )
    }

    /// The process at the other end of the link.
    pub fn peer(&self) -> PeerId {
        self.router.peer
    }

    /// This communicator's context.
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Send a message. Blocks until the link has accepted it.
    pub fn send(&self, tag: Tag, payload: &[u8]) -> Result<()> {
        self.router.send(self.context, tag, payload)
    }

    /// Receive the next message with `tag` into `buf`.
    ///
    /// Messages shorter than `buf` are accepted; [`Status::len`] reports the
    /// received size. Longer messages fail with [`Error::Truncated`] and are
    /// consumed.
    pub fn recv_into(&self, tag: Tag, buf: &mut [u8]) -> Result<Status> {
        let (_, payload) = self.router.take(self.context, &[tag])?;
        self.message(tag, payload).receive_into(buf)
    }

    /// Matched probe: wait for the next message with `tag` and take it off
    /// the match queue without reading it.
    ///
    /// The returned [`Message`] reports the size before any buffer is
    /// allocated, and no other receive can match it any more.
    pub fn mprobe(&self, tag: Tag) -> Result<Message> {
        self.mprobe_any(&[tag])
    }

    /// Matched probe over several tags.
    ///
    /// Takes the earliest arrived message whose tag is in `tags`; its tag is
    /// available through [`Message::tag`]. An empty `tags` slice is rejected.
    pub fn mprobe_any(&self, tags: &[Tag]) -> Result<Message> {
        if tags.is_empty() {
            return Err(Error::Protocol("probe needs at least one tag".into()));
        }
        let (tag, payload) = self.router.take(self.context, tags)?;
        Ok(self.message(tag, payload))
    }

    /// Open a new context on the same link.
    ///
    /// Contexts are numbered in creation order on each side, so both peers
    /// must duplicate in the same order to talk to each other through the
    /// new communicators.
    pub fn dup(&self) -> Result<Communicator> {
        Router::ensure_open(&self.router.lock(), self.context)?;
        let context = self.router.open_context();
        tracing::debug!(peer = %self.router.peer, from = %self.context, to = %context, "duplicated context");
        Ok(Communicator {
            router: Arc::clone(&self.router),
            context,
        })
    }

    /// Close this context.
    ///
    /// Messages parked for it are dropped, later ones are discarded on
    /// arrival. Closing the last open context closes the link. Closing a
    /// context twice fails with [`Error::ContextClosed`].
    pub fn disconnect(&self) -> Result<()> {
        self.router.close_context(self.context)
    }

    /// Number of messages that arrived for this context and wait to be received.
    pub fn parked(&self) -> usize {
        self.router.parked(self.context)
    }

    fn message(&self, tag: Tag, payload: Bytes) -> Message {
        Message {
            source: self.router.peer,
            tag,
            payload,
        }
    }
}

impl fmt::Debug for Communicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Communicator")
            .field("peer", &self.router.peer)
            .field("context", &self.context)
            .finish()
    }
}

/// A message matched by [`Communicator::mprobe`] and not yet received.
#[derive(Debug)]
pub struct Message {
    source: PeerId,
    tag: Tag,
    payload: Bytes,
}

impl Message {
    /// Size of the message in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the message has no payload.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Tag of the message.
    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// Complete the receive into `buf`.
    pub fn receive_into(self, buf: &mut [u8]) -> Result<Status> {
        let len = self.payload.len();
        if len > buf.len() {
            return Err(Error::Truncated {
                tag: self.tag,
                expected: buf.len(),
                actual: len,
            });
        }
        buf[..len].copy_from_slice(&self.payload);
        Ok(Status {
            source: self.source,
            tag: self.tag,
            len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::{Instance, MessageKind};
    use std::thread;

    fn tag(kind: MessageKind, instance: u8) -> Tag {
        Tag::encode(kind, Instance::from_raw(instance))
    }

    #[test]
    fn test_send_recv() {
        let (a, b) = Communicator::local_pair();
        let t = tag(MessageKind::TrivialProduct, 1);

        a.send(t, &[1, 2, 3]).unwrap();

        let mut buf = [0u8; 8];
        let status = b.recv_into(t, &mut buf).unwrap();
        assert_eq!(status.len, 3);
        assert_eq!(status.tag, t);
        assert_eq!(status.source, PeerId(0));
        assert_eq!(&buf[..3], &[1, 2, 3]);
    }

    #[test]
    fn test_tag_matching_out_of_order() {
        let (a, b) = Communicator::local_pair();
        let first = tag(MessageKind::RunRecord, 1);
        let second = tag(MessageKind::UnitRecord, 1);

        a.send(first, b"first").unwrap();
        a.send(second, b"second").unwrap();

        // Ask for the later tag first; the earlier message stays parked.
        let mut buf = [0u8; 16];
        let status = b.recv_into(second, &mut buf).unwrap();
        assert_eq!(&buf[..status.len], b"second");
        assert_eq!(b.parked(), 1);

        let status = b.recv_into(first, &mut buf).unwrap();
        assert_eq!(&buf[..status.len], b"first");
        assert_eq!(b.parked(), 0);
    }

    #[test]
    fn test_fifo_per_tag() {
        let (a, b) = Communicator::local_pair();
        let t = tag(MessageKind::TrivialCopyProduct, 9);

        for i in 0..20u8 {
            a.send(t, &[i]).unwrap();
        }
        for i in 0..20u8 {
            let mut buf = [0u8; 1];
            b.recv_into(t, &mut buf).unwrap();
            assert_eq!(buf[0], i);
        }
    }

    #[test]
    fn test_truncation() {
        let (a, b) = Communicator::local_pair();
        let t = tag(MessageKind::TrivialCopyProduct, 1);

        a.send(t, &[0u8; 10]).unwrap();
        let mut buf = [0u8; 4];
        match b.recv_into(t, &mut buf) {
            Err(Error::Truncated {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 4);
                assert_eq!(actual, 10);
            }
            other => panic!("expected truncation, got {other:?}"),
        }
    }

    #[test]
    fn test_mprobe_reports_size() {
        let (a, b) = Communicator::local_pair();
        let t = tag(MessageKind::SerializedProduct, 2);

        a.send(t, &[7u8; 37]).unwrap();

        let message = b.mprobe(t).unwrap();
        assert_eq!(message.len(), 37);
        assert_eq!(message.tag(), t);

        let mut buf = vec![0u8; message.len()];
        let status = message.receive_into(&mut buf).unwrap();
        assert_eq!(status.len, 37);
        assert!(buf.iter().all(|byte| *byte == 7));
    }

    #[test]
    fn test_mprobe_message_cannot_be_stolen() {
        let (a, b) = Communicator::local_pair();
        let t = tag(MessageKind::SerializedProduct, 2);

        a.send(t, b"one").unwrap();
        a.send(t, b"two").unwrap();

        let probed = b.mprobe(t).unwrap();
        // A plain receive now matches the second message, not the probed one.
        let mut buf = [0u8; 3];
        b.recv_into(t, &mut buf).unwrap();
        assert_eq!(&buf, b"two");

        let mut buf = [0u8; 3];
        probed.receive_into(&mut buf).unwrap();
        assert_eq!(&buf, b"one");
    }

    #[test]
    fn test_mprobe_any_follows_arrival_order() {
        let (a, b) = Communicator::local_pair();
        let run = tag(MessageKind::RunRecord, 3);
        let unit = tag(MessageKind::UnitRecord, 3);
        let other = tag(MessageKind::UnitRecord, 4);

        a.send(other, b"x").unwrap();
        a.send(unit, b"u1").unwrap();
        a.send(run, b"r1").unwrap();
        a.send(unit, b"u2").unwrap();

        let wanted = [run, unit];
        let order: Vec<Tag> = (0..3)
            .map(|_| {
                let message = b.mprobe_any(&wanted).unwrap();
                let tag = message.tag();
                let mut buf = [0u8; 2];
                message.receive_into(&mut buf).unwrap();
                tag
            })
            .collect();
        assert_eq!(order, vec![unit, run, unit]);

        // The message for another instance is still parked.
        assert_eq!(b.parked(), 1);
        assert!(matches!(b.mprobe_any(&[]), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_dup_isolates_contexts() {
        let (a, b) = Communicator::local_pair();
        let a2 = a.dup().unwrap();
        let b2 = b.dup().unwrap();
        assert_eq!(a2.context(), b2.context());
        assert_ne!(a.context(), a2.context());

        let t = tag(MessageKind::TrivialProduct, 1);
        a.send(t, b"orig").unwrap();
        a2.send(t, b"dup!").unwrap();

        let mut buf = [0u8; 4];
        b2.recv_into(t, &mut buf).unwrap();
        assert_eq!(&buf, b"dup!");
        b.recv_into(t, &mut buf).unwrap();
        assert_eq!(&buf, b"orig");
    }

    #[test]
    fn test_disconnect() {
        let (a, b) = Communicator::local_pair();
        let a2 = a.dup().unwrap();
        let t = tag(MessageKind::Empty, 0);

        a2.disconnect().unwrap();
        assert!(matches!(a2.send(t, &[]), Err(Error::ContextClosed(_))));
        assert!(matches!(a2.disconnect(), Err(Error::ContextClosed(_))));

        // The root context is still usable.
        a.send(t, &[]).unwrap();
        let mut buf = [0u8; 0];
        b.recv_into(t, &mut buf).unwrap();

        // Closing the last context closes the link; the peer sees the disconnect.
        a.disconnect().unwrap();
        assert!(matches!(b.recv_into(t, &mut buf), Err(Error::Disconnected)));
    }

    #[test]
    fn test_concurrent_contexts() {
        let (a, b) = Communicator::local_pair();
        let a2 = a.dup().unwrap();
        let b2 = b.dup().unwrap();
        let t = tag(MessageKind::TrivialCopyProduct, 5);
        let count = 200u32;

        let sender = thread::spawn(move || {
            for i in 0..count {
                a.send(t, &i.to_le_bytes()).unwrap();
                a2.send(t, &(i + 1000).to_le_bytes()).unwrap();
            }
        });

        let b = Arc::new(b);
        let reader = {
            let b = Arc::clone(&b);
            thread::spawn(move || {
                for i in 0..count {
                    let mut buf = [0u8; 4];
                    b.recv_into(t, &mut buf).unwrap();
                    assert_eq!(u32::from_le_bytes(buf), i);
                }
            })
        };
        for i in 0..count {
            let mut buf = [0u8; 4];
            b2.recv_into(t, &mut buf).unwrap();
            assert_eq!(u32::from_le_bytes(buf), i + 1000);
        }

        sender.join().unwrap();
        reader.join().unwrap();
    }
}
