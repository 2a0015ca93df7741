//! Framed links over byte streams (Unix domain sockets, TCP).
//!
//! ## Framing
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │ Context: u32 (LE)                    │
//! │ Tag: i32 (LE)                        │
//! │ Payload length: u32 (LE)             │
//! ├──────────────────────────────────────┤
//! │ Payload                              │
//! └──────────────────────────────────────┘
//! ```
//!
//! The length belongs to the transport envelope only. Protocols layered on
//! top see whole messages and never read it.

use super::{ContextId, Frame, Link, MAX_FRAME_PAYLOAD};
use crate::error::{Error, Result};
use crate::tag::Tag;
use bytes::Bytes;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::sync::{Mutex, PoisonError};


/// Header preceding every frame on a stream.
/// Using manual serialization to avoid packed struct alignment issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameHeader {
    context: u32,
    tag: i32,
    payload_len: u32,
}

impl FrameHeader {
    const SIZE: usize = 4 + 4 + 4; // 12 bytes

    fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.context.to_le_bytes());
        buf[4..8].copy_from_slice(&self.tag.to_le_bytes());
        buf[8..12].copy_from_slice(&self.payload_len.to_le_bytes());
        buf
    }

    fn from_bytes(buf: &[u8; Self::SIZE]) -> Self {
        Self {
            context: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            tag: i32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            payload_len: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
        }
    }
}

/// A byte stream that can be split into independent read and write halves.
pub trait DuplexStream: Read + Write + Send + Sync + Sized + 'static {
    /// Open a second handle to the same stream.
    fn try_clone_stream(&self) -> io::Result<Self>;

    /// Shut down one or both directions of the stream.
    fn shutdown_stream(&self, how: Shutdown) -> io::Result<()>;
}

impl DuplexStream for UnixStream {
    fn try_clone_stream(&self) -> io::Result<Self> {
        self.try_clone()
    }

    fn shutdown_stream(&self, how: Shutdown) -> io::Result<()> {
        self.shutdown(how)
    }
}

impl DuplexStream for TcpStream {
    fn try_clone_stream(&self) -> io::Result<Self> {
        self.try_clone()
    }

    fn shutdown_stream(&self, how: Shutdown) -> io::Result<()> {
        self.shutdown(how)
    }
}

/// A link that frames messages over a byte stream.
///
/// # Example
///
/// ```rust,ignore
/// use parallax_bridge::link::{StreamLink, UnixLinkListener};
///
/// // Process A
/// let listener = UnixLinkListener::bind("/tmp/bridge.sock")?;
/// let link = listener.accept()?;
///
/// // Process B
/// let link = StreamLink::connect_unix("/tmp/bridge.sock")?;
/// ```
pub struct StreamLink<S: DuplexStream> {
    reader: Mutex<S>,
    writer: Mutex<S>,
}

impl<S: DuplexStream> StreamLink<S> {
    /// Wrap a connected stream.
    pub fn new(stream: S) -> Result<Self> {
        let reader = stream.try_clone_stream()?;
        Ok(Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(stream),
        })
    }
}

impl StreamLink<UnixStream> {
    /// Create a connected pair of links over an anonymous Unix socket pair.
    pub fn unix_pair() -> Result<(Self, Self)> {
        let (a, b) = UnixStream::pair()?;
        Ok((Self::new(a)?, Self::new(b)?))
    }

    /// Connect to a [`UnixLinkListener`] at the given path.
    pub fn connect_unix<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(UnixStream::connect(path)?)
    }
}

impl StreamLink<TcpStream> {
    /// Connect to a [`TcpLinkListener`].
    pub fn connect_tcp<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Self::new(stream)
    }

    /// The peer address.
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        let writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(writer.peer_addr()?)
    }
}

impl<S: DuplexStream> Link for StreamLink<S> {
    fn send_frame(&self, frame: Frame) -> Result<()> {
        let payload_len = u32::try_from(frame.payload.len())
            .ok()
            .filter(|len| *len as usize <= MAX_FRAME_PAYLOAD)
            .ok_or_else(|| {
                Error::Protocol(format!("payload of {} bytes is too large", frame.payload.len()))
            })?;
        let header = FrameHeader {
            context: frame.context.0,
            tag: frame.tag.get(),
            payload_len,
        };

        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(&header.to_bytes()).map_err(map_disconnect)?;
        writer.write_all(&frame.payload).map_err(map_disconnect)?;
        writer.flush().map_err(map_disconnect)?;
        Ok(())
    }

    fn recv_frame(&self) -> Result<Frame> {
        let mut reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner);

        let mut header_buf = [0u8; FrameHeader::SIZE];
        reader.read_exact(&mut header_buf).map_err(map_disconnect)?;
        let header = FrameHeader::from_bytes(&header_buf);

        let payload_len = header.payload_len as usize;
        if payload_len > MAX_FRAME_PAYLOAD {
            return Err(Error::Protocol(format!(
                "frame announces {payload_len} bytes, limit is {MAX_FRAME_PAYLOAD}"
            )));
        }

        let mut payload = vec![0u8; payload_len];
        reader.read_exact(&mut payload).map_err(map_disconnect)?;

        Ok(Frame {
            context: ContextId(header.context),
            tag: Tag::from_raw(header.tag),
            payload: Bytes::from(payload),
        })
    }

    fn close(&self) -> Result<()> {
        let writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        match writer.shutdown_stream(Shutdown::Write) {
            Ok(()) => Ok(()),
            // The peer may already be gone.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

fn map_disconnect(e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted => Error::Disconnected,
        _ => Error::Io(e),
    }
}

/// Accepts stream links on a Unix domain socket path.
pub struct UnixLinkListener {
    listener: UnixListener,
}

impl UnixLinkListener {
    /// Bind to the given socket path.
    ///
    /// The socket file will be created. If it already exists, it will be removed.
    pub fn bind<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Remove existing socket if present
        if path.exists() {
            std::fs::remove_file(path)?;
        }

        Ok(Self {
            listener: UnixListener::bind(path)?,
        })
    }

    /// Block until a peer connects.
    pub fn accept(&self) -> Result<StreamLink<UnixStream>> {
        let (stream, _addr) = self.listener.accept()?;
        StreamLink::new(stream)
    }
}

/// Accepts stream links on a TCP address.
pub struct TcpLinkListener {
    listener: TcpListener,
}

impl TcpLinkListener {
    /// Listen on the given address.
    pub fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        Ok(Self {
            listener: TcpListener::bind(addr)?,
        })
    }

    /// The address actually bound (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Block until a peer connects.
    pub fn accept(&self) -> Result<StreamLink<TcpStream>> {
        let (stream, _addr) = self.listener.accept()?;
        stream.set_nodelay(true)?;
        StreamLink::new(stream)
    }
}
