//! Error types for Parallax Bridge.

use crate::link::ContextId;
use crate::tag::Tag;
use thiserror::Error;

/// Result type alias using Parallax Bridge's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for bridge operations.
///
/// Configuration errors are raised while coordinators are being set up. All
/// other variants are raised while moving data and are fatal for the unit of
/// work that hit them.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid coordinator or binding configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Operation on a channel that has been reset.
    #[error("invalid channel: {0}")]
    InvalidChannel(String),

    /// Operation on a transport context that was already disconnected.
    #[error("transport context {0} is closed")]
    ContextClosed(ContextId),

    /// The peer went away or the link was closed underneath us.
    #[error("link disconnected")]
    Disconnected,

    /// An incoming message does not fit the posted receive buffer.
    #[error("message with tag {tag} truncated: {actual} bytes into a {expected}-byte buffer")]
    Truncated {
        /// Tag of the offending message.
        tag: Tag,
        /// Size of the posted receive buffer.
        expected: usize,
        /// Size of the incoming message.
        actual: usize,
    },

    /// A raw tag value that does not decode to a known message kind.
    #[error("invalid message tag: {0}")]
    InvalidTag(i32),

    /// Malformed frame or record on the wire.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The streaming capability failed to write or read a product.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A product does not have the type its binding expects.
    #[error("product type mismatch: binding expects {expected} for {binding}")]
    ProductType {
        /// Type name declared by the binding's descriptor.
        expected: &'static str,
        /// Product identity of the binding.
        binding: String,
    },

    /// A product requested from the host pipeline is not available.
    #[error("missing product: {0}")]
    MissingProduct(String),

    /// Synchronizing the originating compute queue failed.
    #[error("compute queue error: {0}")]
    Queue(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error was raised while setting a coordinator up rather
    /// than while transferring data.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }
}
