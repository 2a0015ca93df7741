//! A bidirectional channel to one peer process.
//!
//! A [`Channel`] owns one transport context on a link and knows which peer
//! sits at the other end. It is either valid (context open, peer known) or
//! reset (context closed, peer cleared); every operation except
//! [`duplicate`](Channel::duplicate) and [`reset`](Channel::reset) needs a
//! valid channel.
//!
//! The product transfer protocols live in [`protocol`](crate::protocol) and
//! extend this type with further `impl Channel` blocks.

use crate::communicator::{Communicator, Message, PeerId, Status};
use crate::error::{Error, Result};
use crate::link::{Link, LocalLink};
use crate::observability::{
    record_message_received, record_message_sent, trace_receive, trace_send,
};
use crate::provenance::{RunProvenance, UnitProvenance, WindowProvenance};
use crate::record::{EmptyRecord, Record, RunRecord, UnitRecord, WindowRecord};
use crate::tag::{Instance, MessageKind, Tag};

/// Kinds matched by [`Channel::probe_record`].
const RECORD_KINDS: [MessageKind; 4] = [
    MessageKind::Empty,
    MessageKind::RunRecord,
    MessageKind::WindowRecord,
    MessageKind::UnitRecord,
];

/// Transport context bound to one peer.
#[derive(Debug)]
pub struct Channel {
    comm: Option<Communicator>,
    peer: Option<PeerId>,
}

impl Channel {
    /// Bind a channel to the peer of an open communicator.
    pub fn new(comm: Communicator) -> Self {
        let peer = comm.peer();
        Self {
            comm: Some(comm),
            peer: Some(peer),
        }
    }

    /// Bind a channel to a freshly connected link.
    pub fn from_link(link: impl Link + 'static, peer: PeerId) -> Self {
        Self::new(Communicator::new(link, peer))
    }

    /// Create two channels connected to each other in this process.
    pub fn local_pair() -> (Channel, Channel) {
        let (a, b) = LocalLink::pair();
        (
            Channel::from_link(a, PeerId(1)),
            Channel::from_link(b, PeerId(0)),
        )
    }

    /// Whether the channel has not been reset.
    pub fn is_valid(&self) -> bool {
        self.comm.is_some() && self.peer.is_some()
    }

    /// The peer this channel talks to, if the channel is valid.
    pub fn peer(&self) -> Option<PeerId> {
        self.peer
    }

    fn comm(&self) -> Result<&Communicator> {
        self.comm
            .as_ref()
            .ok_or_else(|| Error::InvalidChannel("channel has been reset".into()))
    }

    /// Open an independent channel to the same peer on a new transport context.
    ///
    /// The original stays open. Both peers must duplicate their channels in
    /// the same order for the new contexts to be connected.
    pub fn duplicate(&self) -> Result<Channel> {
        let comm = self.comm()?.dup()?;
        Ok(Channel::new(comm))
    }

    /// Close the transport context and invalidate the channel.
    ///
    /// Resetting a channel twice is a caller error and fails with
    /// [`Error::InvalidChannel`].
    pub fn reset(&mut self) -> Result<()> {
        let comm = self
            .comm
            .take()
            .ok_or_else(|| Error::InvalidChannel("channel reset twice".into()))?;
        self.peer = None;
        tracing::debug!(context = %comm.context(), "resetting channel");
        comm.disconnect()
    }

    /// Send raw bytes under `kind` for `instance`.
    pub(crate) fn send_raw(&self, kind: MessageKind, instance: Instance, payload: &[u8]) -> Result<()> {
        let comm = self.comm()?;
        let tag = Tag::encode(kind, instance);
        trace_send(tag, payload.len());
        comm.send(tag, payload)?;
        record_message_sent(kind, payload.len());
        Ok(())
    }

    /// Receive raw bytes under `kind` for `instance` into `buf`.
    pub(crate) fn receive_raw(
        &self,
        kind: MessageKind,
        instance: Instance,
        buf: &mut [u8],
    ) -> Result<Status> {
        let comm = self.comm()?;
        let tag = Tag::encode(kind, instance);
        let status = comm.recv_into(tag, buf)?;
        trace_receive(tag, status.len);
        record_message_received(kind, status.len);
        Ok(status)
    }

    /// Matched probe for the next message under `kind` for `instance`.
    pub(crate) fn probe(&self, kind: MessageKind, instance: Instance) -> Result<Message> {
        let comm = self.comm()?;
        let tag = Tag::encode(kind, instance);
        tracing::trace!(tag = %tag, "probe");
        comm.mprobe(tag)
    }

    /// Complete the receive of a probed message.
    pub(crate) fn receive_probed(&self, message: Message, buf: &mut [u8]) -> Result<Status> {
        let tag = message.tag();
        let status = message.receive_into(buf)?;
        trace_receive(tag, status.len);
        if let Ok((kind, _)) = tag.decode() {
            record_message_received(kind, status.len);
        }
        Ok(status)
    }

    /// Send a zero-payload synchronization signal.
    pub fn send_empty(&self, kind: MessageKind, instance: Instance) -> Result<()> {
        let record = EmptyRecord::from_provenance(Tag::encode(kind, instance), &());
        self.send_raw(kind, instance, &record.to_vec())
    }

    /// Wait for a synchronization signal sent with [`send_empty`](Self::send_empty).
    pub fn receive_empty(&self, kind: MessageKind, instance: Instance) -> Result<Status> {
        let mut buf = [0u8; EmptyRecord::SIZE];
        self.receive_raw(kind, instance, &mut buf)
    }

    /// Send a provenance record.
    pub fn send_record<R: Record>(&self, instance: Instance, provenance: &R::Provenance) -> Result<()> {
        let record = R::from_provenance(Tag::encode(R::KIND, instance), provenance);
        self.send_raw(R::KIND, instance, &record.to_vec())
    }

    /// Receive a provenance record.
    pub fn receive_record<R: Record>(&self, instance: Instance) -> Result<R::Provenance> {
        let mut buf = vec![0u8; R::SIZE];
        let status = self.receive_raw(R::KIND, instance, &mut buf)?;
        Ok(R::read_from(&buf[..status.len])?.to_provenance())
    }

    /// Matched probe for the next provenance record or synchronization
    /// signal for `instance`, whichever arrived first.
    ///
    /// Returns the decoded kind so the caller can pick the record type to
    /// hand to [`receive_record_probed`](Self::receive_record_probed).
    pub fn probe_record(&self, instance: Instance) -> Result<(MessageKind, Message)> {
        let comm = self.comm()?;
        let tags = RECORD_KINDS.map(|kind| Tag::encode(kind, instance));
        let message = comm.mprobe_any(&tags)?;
        let (kind, _) = message.tag().decode()?;
        tracing::trace!(tag = %message.tag(), kind = kind.as_str(), "probed record");
        Ok((kind, message))
    }

    /// Complete the receive of a record matched by [`probe_record`](Self::probe_record).
    ///
    /// Fails with [`Error::Protocol`] when the message was not sent as an `R`.
    pub fn receive_record_probed<R: Record>(&self, message: Message) -> Result<R::Provenance> {
        let (kind, _) = message.tag().decode()?;
        if kind != R::KIND {
            return Err(Error::Protocol(format!(
                "expected {} record, probed {}",
                R::KIND.as_str(),
                kind.as_str()
            )));
        }
        let mut buf = vec![0u8; R::SIZE];
        let status = self.receive_probed(message, &mut buf)?;
        Ok(R::read_from(&buf[..status.len])?.to_provenance())
    }

    /// Send run provenance.
    pub fn send_run(&self, instance: Instance, run: &RunProvenance) -> Result<()> {
        self.send_record::<RunRecord>(instance, run)
    }

    /// Receive run provenance.
    pub fn receive_run(&self, instance: Instance) -> Result<RunProvenance> {
        self.receive_record::<RunRecord>(instance)
    }

    /// Send time-window provenance.
    pub fn send_window(&self, instance: Instance, window: &WindowProvenance) -> Result<()> {
        self.send_record::<WindowRecord>(instance, window)
    }

    /// Receive time-window provenance.
    pub fn receive_window(&self, instance: Instance) -> Result<WindowProvenance> {
        self.receive_record::<WindowRecord>(instance)
    }

    /// Send unit provenance.
    pub fn send_unit(&self, instance: Instance, unit: &UnitProvenance) -> Result<()> {
        self.send_record::<UnitRecord>(instance, unit)
    }

    /// Receive unit provenance.
    pub fn receive_unit(&self, instance: Instance) -> Result<UnitProvenance> {
        self.receive_record::<UnitRecord>(instance)
    }

    /// Send a plain fixed-size value as its raw bytes.
    pub fn send_trivial_product<T: TrivialValue>(&self, instance: Instance, value: &T) -> Result<()> {
        self.send_raw(MessageKind::TrivialProduct, instance, value.to_le_vec().as_slice())
    }

    /// Receive a plain fixed-size value.
    pub fn receive_trivial_product<T: TrivialValue>(&self, instance: Instance) -> Result<T> {
        let mut buf = vec![0u8; T::SIZE];
        let status = self.receive_raw(MessageKind::TrivialProduct, instance, &mut buf)?;
        if status.len != T::SIZE {
            return Err(Error::Protocol(format!(
                "trivial product needs {} bytes, got {}",
                T::SIZE,
                status.len
            )));
        }
        Ok(T::from_le_slice(&buf))
    }
}

/// A plain value with a fixed little-endian wire form.
pub trait TrivialValue: Sized + Send + Sync + 'static {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Encode as little-endian bytes.
    fn to_le_vec(&self) -> Vec<u8>;

    /// Decode from exactly [`SIZE`](TrivialValue::SIZE) little-endian bytes.
    fn from_le_slice(bytes: &[u8]) -> Self;
}

macro_rules! impl_trivial_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl TrivialValue for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn to_le_vec(&self) -> Vec<u8> {
                    self.to_le_bytes().to_vec()
                }

                fn from_le_slice(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(&bytes[..Self::SIZE]);
                    <$ty>::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_trivial_value!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

impl TrivialValue for bool {
    const SIZE: usize = 1;

    fn to_le_vec(&self) -> Vec<u8> {
        vec![u8::from(*self)]
    }

    fn from_le_slice(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}
