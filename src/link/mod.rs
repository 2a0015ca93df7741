//! Physical point-to-point links between two processes.
//!
//! A link moves whole [`Frame`]s between exactly two endpoints, in order. It
//! knows nothing about tags or contexts beyond carrying them; matching
//! receives against tags is the job of the [`Communicator`](crate::communicator::Communicator)
//! layered on top.
//!
//! ## Link Types
//!
//! - [`LocalLink`]: In-process link pair (using kanal), threads standing in for processes
//! - [`StreamLink`]: Framed link over a Unix domain socket or a TCP connection

mod local;
mod stream;

pub use local::LocalLink;
pub use stream::{DuplexStream, StreamLink, TcpLinkListener, UnixLinkListener};

use crate::error::Result;
use crate::tag::Tag;
use bytes::Bytes;
use std::fmt;

/// Largest message payload a link carries.
pub const MAX_FRAME_PAYLOAD: usize = 1 << 30;

/// Identifier of a transport context multiplexed over one link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u32);

impl ContextId {
    /// The context every link starts with.
    pub const ROOT: ContextId = ContextId(0);
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One transport message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Context the message belongs to.
    pub context: ContextId,
    /// Message tag.
    pub tag: Tag,
    /// Message body.
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame, copying the payload.
    pub fn new(context: ContextId, tag: Tag, payload: &[u8]) -> Self {
        Self {
            context,
            tag,
            payload: Bytes::copy_from_slice(payload),
        }
    }
}

/// A bidirectional, ordered, point-to-point frame transport.
///
/// Implementations must be safe to share between threads: one thread may be
/// blocked in [`recv_frame`](Link::recv_frame) while others send.
pub trait Link: Send + Sync {
    /// Send one frame to the peer.
    fn send_frame(&self, frame: Frame) -> Result<()>;

    /// Block until the next frame from the peer arrives.
    ///
    /// Returns [`Error::Disconnected`](crate::Error::Disconnected) once the
    /// peer has closed its side and every frame it sent has been delivered.
    fn recv_frame(&self) -> Result<Frame>;

    /// Stop sending. Frames already sent are still delivered to the peer.
    fn close(&self) -> Result<()>;
}
