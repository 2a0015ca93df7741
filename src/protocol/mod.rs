//! Product transfer protocols.
//!
//! Both protocols extend [`Channel`](crate::channel::Channel) with send and
//! receive operations for one product at a time.
//!
//! ## Trivial copy
//!
//! ```text
//! [parameters]  region 0  region 1  ...     all under TrivialCopyProduct
//! ```
//!
//! The parameter message is present only for types that require it. The
//! number of regions and their sizes are fixed by the type on both sides.
//!
//! ## Serialized
//!
//! ```text
//! blob                                      under SerializedProduct
//! ```
//!
//! The receiver probes the message to learn the blob size, allocates, then
//! receives the probed message.

mod serialized;
mod trivial;

pub(crate) use serialized::SerializedCodec;
pub(crate) use trivial::TrivialCopyCodec;

use crate::error::{Error, Result};
use crate::product::AnyProduct;

fn downcast<T: 'static>(product: &AnyProduct) -> Result<&T> {
    product.downcast_ref::<T>().ok_or_else(|| Error::ProductType {
        expected: std::any::type_name::<T>(),
        binding: "<unbound>".into(),
    })
}
