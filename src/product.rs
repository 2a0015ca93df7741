//! Product type descriptors and identities.
//!
//! A [`ProductType`] describes how one kind of product crosses a channel. It
//! is built once, when bindings are configured, and carries an explicit
//! [`Capability`]:
//!
//! - [`FlatCopyable`](Capability::FlatCopyable): the product is a fixed set of
//!   flat byte regions whose shape both peers know in advance.
//! - [`RequiresParameters`](Capability::RequiresParameters): as above, but the
//!   receiver needs a small parameter blob before it can allocate the regions.
//! - [`SerializeOnly`](Capability::SerializeOnly): the product goes through a
//!   [`Streamer`] and a probe-sized receive.

use crate::channel::Channel;
use crate::error::{Error, Result};
use crate::link::MAX_FRAME_PAYLOAD;
use crate::protocol::{SerializedCodec, TrivialCopyCodec};
use crate::tag::Instance;
use rkyv::api::high::{HighSerializer, HighValidator};
use rkyv::bytecheck::CheckBytes;
use rkyv::de::Pool;
use rkyv::rancor::{self, Strategy};
use rkyv::ser::allocator::ArenaHandle;
use rkyv::util::AlignedVec;
use smallvec::{SmallVec, smallvec};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A type-erased product.
pub type AnyProduct = dyn Any + Send + Sync;

/// How a product type crosses a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Flat regions only.
    FlatCopyable,
    /// Flat regions preceded by a parameter message.
    RequiresParameters,
    /// Serialized blob.
    SerializeOnly,
}

/// A product that can be sent as one or more flat byte regions.
///
/// Sender and receiver must agree on the number and size of the regions: no
/// count or length travels with them. A type whose region sizes vary must set
/// [`REQUIRES_PARAMETERS`](TrivialCopy::REQUIRES_PARAMETERS) and describe
/// the shape in [`parameters`](TrivialCopy::parameters).
pub trait TrivialCopy: Sized + Send + Sync + 'static {
    /// Whether a parameter message precedes the regions.
    const REQUIRES_PARAMETERS: bool;

    /// Side information the receiver needs to allocate the product.
    fn parameters(&self) -> Vec<u8> {
        Vec::new()
    }

    /// The regions to send, in order.
    fn regions(&self) -> SmallVec<[&[u8]; 2]>;

    /// Allocate an uninitialized product ready to receive regions.
    ///
    /// `parameters` is `Some` exactly when the type requires parameters.
    fn allocate(parameters: Option<&[u8]>) -> Result<Self>;

    /// The regions to receive into, in the same order as [`regions`](TrivialCopy::regions).
    fn regions_mut(&mut self) -> SmallVec<[&mut [u8]; 2]>;

    /// Called once every region has been received.
    fn finalize(&mut self) -> Result<()> {
        Ok(())
    }
}

impl TrivialCopy for Vec<u8> {
    const REQUIRES_PARAMETERS: bool = true;

    fn parameters(&self) -> Vec<u8> {
        (self.len() as u64).to_le_bytes().to_vec()
    }

    fn regions(&self) -> SmallVec<[&[u8]; 2]> {
        smallvec![self.as_slice()]
    }

    fn allocate(parameters: Option<&[u8]>) -> Result<Self> {
        let raw: [u8; 8] = parameters
            .and_then(|p| p.try_into().ok())
            .ok_or_else(|| Error::Protocol("byte vector parameters must be 8 bytes".into()))?;
        let len = u64::from_le_bytes(raw);
        let len = usize::try_from(len)
            .ok()
            .filter(|len| *len <= MAX_FRAME_PAYLOAD)
            .ok_or_else(|| Error::Protocol(format!("byte vector of {len} bytes exceeds the message limit")))?;
        Ok(vec![0u8; len])
    }

    fn regions_mut(&mut self) -> SmallVec<[&mut [u8]; 2]> {
        smallvec![self.as_mut_slice()]
    }
}

impl<const N: usize> TrivialCopy for [u8; N] {
    const REQUIRES_PARAMETERS: bool = false;

    fn regions(&self) -> SmallVec<[&[u8]; 2]> {
        smallvec![self.as_slice()]
    }

    fn allocate(_: Option<&[u8]>) -> Result<Self> {
        Ok([0u8; N])
    }

    fn regions_mut(&mut self) -> SmallVec<[&mut [u8]; 2]> {
        smallvec![self.as_mut_slice()]
    }
}

/// A generic streaming capability: writes a value into bytes and reads it back.
///
/// Both peers must use streamers that agree on the format; a mismatch is not
/// detected and yields a corrupted or failed read.
pub trait Streamer<T>: Send + Sync + 'static {
    /// Append the streamed form of `value` to `out`.
    fn stream_out(&self, value: &T, out: &mut Vec<u8>) -> Result<()>;

    /// Rebuild a value from its streamed form.
    fn stream_in(&self, bytes: &[u8]) -> Result<T>;
}

/// Streams any rkyv-archivable type.
///
/// Received bytes are copied into an aligned buffer and validated before
/// they are deserialized.
#[derive(Debug, Clone, Copy, Default)]
pub struct RkyvStreamer;

impl<T> Streamer<T> for RkyvStreamer
where
    T: rkyv::Archive + for<'a> rkyv::Serialize<HighSerializer<AlignedVec, ArenaHandle<'a>, rancor::Error>>,
    T::Archived: for<'a> CheckBytes<HighValidator<'a, rancor::Error>>
        + rkyv::Deserialize<T, Strategy<Pool, rancor::Error>>,
{
    fn stream_out(&self, value: &T, out: &mut Vec<u8>) -> Result<()> {
        let bytes = rkyv::to_bytes::<rancor::Error>(value)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        out.extend_from_slice(&bytes);
        Ok(())
    }

    fn stream_in(&self, bytes: &[u8]) -> Result<T> {
        // Copy to aligned buffer for rkyv
        let mut aligned = AlignedVec::<16>::with_capacity(bytes.len());
        aligned.extend_from_slice(bytes);
        rkyv::from_bytes::<T, rancor::Error>(&aligned).map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// Moves one concrete product type over a channel on behalf of a [`ProductType`].
pub(crate) trait ProductCodec: Send + Sync {
    fn is_type(&self, product: &AnyProduct) -> bool;
    fn send(&self, channel: &Channel, instance: Instance, product: &AnyProduct) -> Result<()>;
    fn receive(&self, channel: &Channel, instance: Instance) -> Result<Box<AnyProduct>>;
}

/// Type-erased descriptor of a product type and how it crosses a channel.
#[derive(Clone)]
pub struct ProductType {
    type_name: &'static str,
    capability: Capability,
    codec: Arc<dyn ProductCodec>,
}

impl ProductType {
    /// Descriptor for a flat-region product.
    pub fn trivial_copy<T: TrivialCopy>() -> Self {
        let capability = if T::REQUIRES_PARAMETERS {
            Capability::RequiresParameters
        } else {
            Capability::FlatCopyable
        };
        Self {
            type_name: std::any::type_name::<T>(),
            capability,
            codec: Arc::new(TrivialCopyCodec::<T>::new()),
        }
    }

    /// Descriptor for a product streamed through `streamer`.
    pub fn serialized<T, S>(streamer: S) -> Self
    where
        T: Send + Sync + 'static,
        S: Streamer<T>,
    {
        Self {
            type_name: std::any::type_name::<T>(),
            capability: Capability::SerializeOnly,
            codec: Arc::new(SerializedCodec::new(streamer)),
        }
    }

    /// Descriptor for a product streamed with [`RkyvStreamer`].
    pub fn rkyv<T>() -> Self
    where
        T: Send + Sync + 'static,
        RkyvStreamer: Streamer<T>,
    {
        Self::serialized::<T, _>(RkyvStreamer)
    }

    /// Name of the described Rust type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// How the product crosses a channel.
    pub fn capability(&self) -> Capability {
        self.capability
    }

    /// Whether `product` is of the described type.
    pub fn matches(&self, product: &AnyProduct) -> bool {
        self.codec.is_type(product)
    }

    /// Send a product of the described type.
    pub fn send(&self, channel: &Channel, instance: Instance, product: &AnyProduct) -> Result<()> {
        self.codec.send(channel, instance, product)
    }

    /// Receive a freshly allocated product of the described type.
    pub fn receive(&self, channel: &Channel, instance: Instance) -> Result<Box<AnyProduct>> {
        self.codec.receive(channel, instance)
    }
}

impl fmt::Debug for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProductType")
            .field("type_name", &self.type_name)
            .field("capability", &self.capability)
            .finish()
    }
}

/// Identity of a product in the host pipeline: producer label plus instance name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProductId {
    /// Label of the producing module.
    pub label: String,
    /// Instance name; empty for the producer's default product.
    pub instance: String,
}

impl ProductId {
    /// Create a product identity.
    pub fn new(label: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            instance: instance.into(),
        }
    }

    /// Parse `label:instance`. A missing `:instance` means the empty instance.
    pub fn parse(s: &str) -> Result<Self> {
        let (label, instance) = s.split_once(':').unwrap_or((s, ""));
        if label.is_empty() {
            return Err(Error::Configuration(format!("product '{s}' has an empty label")));
        }
        if instance.contains(':') {
            return Err(Error::Configuration(format!("product '{s}' has more than one ':'")));
        }
        Ok(Self::new(label, instance))
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.label, self.instance)
    }
}

/// A product identity pattern with `*` and `?` wildcards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProductPattern {
    label: String,
    instance: String,
}

impl ProductPattern {
    /// Pattern over label and instance.
    pub fn new(label: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            instance: instance.into(),
        }
    }

    /// Whether the pattern contains wildcards.
    pub fn is_wildcard(&self) -> bool {
        let wild = |s: &str| s.contains(['*', '?']);
        wild(&self.label) || wild(&self.instance)
    }

    /// The identity this pattern names, if it has no wildcards.
    pub fn exact(&self) -> Option<ProductId> {
        (!self.is_wildcard()).then(|| ProductId::new(&self.label, &self.instance))
    }

    /// Whether `product` matches.
    pub fn matches(&self, product: &ProductId) -> bool {
        glob_match(self.label.as_bytes(), product.label.as_bytes())
            && glob_match(self.instance.as_bytes(), product.instance.as_bytes())
    }
}

impl fmt::Display for ProductPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.label, self.instance)
    }
}

impl From<&ProductId> for ProductPattern {
    fn from(id: &ProductId) -> Self {
        Self::new(&id.label, &id.instance)
    }
}

fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some(b'*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(c) if *c == b'?' || *c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    t = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|c| *c == b'*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_selection() {
        assert_eq!(
            ProductType::trivial_copy::<Vec<u8>>().capability(),
            Capability::RequiresParameters
        );
        assert_eq!(
            ProductType::trivial_copy::<[u8; 64]>().capability(),
            Capability::FlatCopyable
        );
        assert_eq!(
            ProductType::rkyv::<Vec<u32>>().capability(),
            Capability::SerializeOnly
        );
    }

    #[test]
    fn test_matches_type() {
        let ty = ProductType::trivial_copy::<Vec<u8>>();
        assert!(ty.matches(&vec![1u8, 2, 3]));
        assert!(!ty.matches(&"not bytes".to_string()));
    }

    #[test]
    fn test_byte_vector_parameters() {
        let v = vec![9u8; 100];
        let params = v.parameters();
        let allocated = <Vec<u8> as TrivialCopy>::allocate(Some(&params)).unwrap();
        assert_eq!(allocated.len(), 100);
        assert!(<Vec<u8> as TrivialCopy>::allocate(None).is_err());
    }

    #[test]
    fn test_byte_vector_length_limit() {
        let huge = (u64::MAX / 2).to_le_bytes();
        assert!(matches!(
            <Vec<u8> as TrivialCopy>::allocate(Some(&huge)),
            Err(Error::Protocol(_))
        ));
        let over = (MAX_FRAME_PAYLOAD as u64 + 1).to_le_bytes();
        assert!(<Vec<u8> as TrivialCopy>::allocate(Some(&over)).is_err());
    }

    #[test]
    fn test_rkyv_streamer() {
        let value: Vec<u32> = (0..10).collect();
        let mut blob = Vec::new();
        RkyvStreamer.stream_out(&value, &mut blob).unwrap();
        let back: Vec<u32> = RkyvStreamer.stream_in(&blob).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_rkyv_streamer_rejects_garbage() {
        let result: Result<Vec<u32>> = RkyvStreamer.stream_in(&[0xff; 3]);
        assert!(matches!(result, Err(Error::Serialization(_))));
    }

    #[test]
    fn test_product_id_parse() {
        assert_eq!(ProductId::parse("hits:").unwrap(), ProductId::new("hits", ""));
        assert_eq!(ProductId::parse("hits").unwrap(), ProductId::new("hits", ""));
        assert_eq!(
            ProductId::parse("clusters:fractions").unwrap(),
            ProductId::new("clusters", "fractions")
        );
        assert!(ProductId::parse(":x").unwrap_err().is_configuration());
        assert!(ProductId::parse("a:b:c").is_err());
        assert_eq!(ProductId::new("a", "b").to_string(), "a:b");
    }

    #[test]
    fn test_pattern_matching() {
        let pattern = ProductPattern::new("ecal*", "?");
        assert!(pattern.is_wildcard());
        assert!(pattern.matches(&ProductId::new("ecalDigis", "x")));
        assert!(!pattern.matches(&ProductId::new("ecalDigis", "")));
        assert!(!pattern.matches(&ProductId::new("hcal", "x")));

        let exact = ProductPattern::new("hits", "");
        assert_eq!(exact.exact(), Some(ProductId::new("hits", "")));
        assert!(exact.matches(&ProductId::new("hits", "")));
        assert!(!exact.matches(&ProductId::new("hits", "more")));

        assert!(glob_match(b"a*b*c", b"axxbyyc"));
        assert!(!glob_match(b"a*b", b"axxc"));
        assert!(glob_match(b"*", b""));
    }
}
