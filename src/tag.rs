//! Message tags.
//!
//! Every transport message carries a single integer tag that combines the
//! kind of message with the logical instance (sender/receiver pairing) that
//! sent it:
//!
//! ```text
//! tag = kind | instance * TAG_WIDTH
//! ```
//!
//! Instances partition the tag space, so coordinators with different
//! instances can share one channel without their messages ever matching each
//! other's receives.

use crate::error::{Error, Result};
use std::fmt;

/// Number of tag values reserved for each instance.
///
/// Must stay larger than the largest [`MessageKind`] value.
pub const TAG_WIDTH: i32 = 16;

/// Largest instance that fits in a tag.
pub const MAX_INSTANCE: u8 = u8::MAX;

/// Kinds of messages exchanged over a channel.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Zero-payload synchronization signal.
    Empty = 0,
    /// Run provenance record.
    RunRecord = 1,
    /// Time-window provenance record.
    WindowRecord = 2,
    /// Per-unit provenance record.
    UnitRecord = 3,
    /// Product serialized through a streaming capability.
    SerializedProduct = 4,
    /// Plain fixed-size value sent as its raw bytes.
    TrivialProduct = 5,
    /// Product sent as one or more flat memory regions.
    TrivialCopyProduct = 6,
}

impl MessageKind {
    /// All message kinds, in wire order.
    pub const ALL: [MessageKind; 7] = [
        MessageKind::Empty,
        MessageKind::RunRecord,
        MessageKind::WindowRecord,
        MessageKind::UnitRecord,
        MessageKind::SerializedProduct,
        MessageKind::TrivialProduct,
        MessageKind::TrivialCopyProduct,
    ];

    /// Short lowercase name, used as a metrics label.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Empty => "empty",
            MessageKind::RunRecord => "run",
            MessageKind::WindowRecord => "window",
            MessageKind::UnitRecord => "unit",
            MessageKind::SerializedProduct => "serialized",
            MessageKind::TrivialProduct => "trivial",
            MessageKind::TrivialCopyProduct => "trivial-copy",
        }
    }
}

impl TryFrom<i32> for MessageKind {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        MessageKind::ALL
            .into_iter()
            .find(|kind| *kind as i32 == value)
            .ok_or(Error::InvalidTag(value))
    }
}

const _: () = assert!((MessageKind::TrivialCopyProduct as i32) < TAG_WIDTH);

/// Logical instance identifying one sender/receiver pairing.
///
/// Instance 0 is reserved for the pairing that bootstraps the channel;
/// coordinators must use an instance in `1..=255`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Instance(u8);

impl Instance {
    /// Instance used by the channel bootstrap pairing.
    pub const BOOTSTRAP: Instance = Instance(0);

    /// Validate a configured coordinator instance.
    pub fn new(value: i64) -> Result<Self> {
        if !(1..=MAX_INSTANCE as i64).contains(&value) {
            return Err(Error::Configuration(format!(
                "invalid instance value {value}, please use a value between 1 and {MAX_INSTANCE}"
            )));
        }
        Ok(Instance(value as u8))
    }

    /// Wrap a raw instance without the coordinator range check.
    ///
    /// Any `u8` fits in a tag, including the bootstrap instance.
    pub const fn from_raw(value: u8) -> Self {
        Instance(value)
    }

    /// The raw instance number.
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A transport tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag(i32);

impl Tag {
    /// Combine a message kind and an instance into a tag.
    pub const fn encode(kind: MessageKind, instance: Instance) -> Self {
        Tag(kind as i32 | instance.0 as i32 * TAG_WIDTH)
    }

    /// Split a tag back into its message kind and instance.
    pub fn decode(self) -> Result<(MessageKind, Instance)> {
        if self.0 < 0 {
            return Err(Error::InvalidTag(self.0));
        }
        let instance = self.0 / TAG_WIDTH;
        if instance > MAX_INSTANCE as i32 {
            return Err(Error::InvalidTag(self.0));
        }
        let kind = MessageKind::try_from(self.0 % TAG_WIDTH).map_err(|_| Error::InvalidTag(self.0))?;
        Ok((kind, Instance(instance as u8)))
    }

    /// Wrap a raw tag value read from the wire.
    pub const fn from_raw(value: i32) -> Self {
        Tag(value)
    }

    /// The raw tag value.
    pub const fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
