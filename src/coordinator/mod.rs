//! Sender and receiver coordinators.
//!
//! A coordinator moves an ordered list of products over one token's channel
//! once per unit of work, then republishes the token so that anything that
//! must run after the transfer can depend on it.
//!
//! ```text
//!            Sender (instance 7)                      Receiver (instance 7)
//!  source ──▶ token ─▶ [sync, send hits] ─────────▶ [receive hits]     ─▶ recv:hits
//!                      [sync, send clusters] ─────▶ [receive clusters] ─▶ recv:clusters
//!                      token ─▶ send:                token ─▶ recv:
//! ```
//!
//! Each coordinator is configured once with a [`CoordinatorConfig`] and one
//! [`ProductType`] per configured product. Construction fails with a
//! configuration error if the instance is outside `1..=255` or the number of
//! products does not match the number of product types.

mod context;
mod receiver;
mod sender;

pub use context::{ComputeQueue, HostQueue, ProductDescription, ProductStore, Scope, UnitContext};
pub use receiver::Receiver;
pub use sender::Sender;

use crate::config::CoordinatorConfig;
use crate::error::{Error, Result};
use crate::product::{Capability, ProductId, ProductType};
use crate::tag::Instance;

/// How a binding's product crosses the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferKind {
    /// Parameter message (if any) followed by flat regions.
    TrivialCopy,
    /// One streamed blob, received after a size probe.
    Serialized,
}

impl TransferKind {
    /// Select the transfer for a capability.
    pub fn for_capability(capability: Capability) -> Self {
        match capability {
            Capability::FlatCopyable | Capability::RequiresParameters => TransferKind::TrivialCopy,
            Capability::SerializeOnly => TransferKind::Serialized,
        }
    }

    /// Short name, used in logs and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            TransferKind::TrivialCopy => "trivial-copy",
            TransferKind::Serialized => "serialized",
        }
    }
}

/// A product bound to the descriptor that moves it.
#[derive(Debug, Clone)]
pub struct TransferBinding {
    /// Product identity.
    pub product: ProductId,
    /// Product descriptor.
    pub product_type: ProductType,
    /// Transfer selected from the descriptor's capability.
    pub kind: TransferKind,
}

impl TransferBinding {
    /// Bind a product to its descriptor.
    pub fn new(product: ProductId, product_type: ProductType) -> Self {
        let kind = TransferKind::for_capability(product_type.capability());
        Self {
            product,
            product_type,
            kind,
        }
    }
}

/// Checks shared by both coordinators.
fn validate(config: &CoordinatorConfig, slots: usize) -> Result<Instance> {
    let instance = Instance::new(config.instance)
        .map_err(|e| Error::Configuration(format!("{}: {e}", config.name)))?;
    if config.products.len() != slots {
        return Err(Error::Configuration(format!(
            "{}: {} products configured but {} product types declared",
            config.name,
            config.products.len(),
            slots
        )));
    }
    Ok(instance)
}

/// Id under which a coordinator republishes its token.
fn token_id(config: &CoordinatorConfig) -> ProductId {
    ProductId::new(&config.name, "")
}
