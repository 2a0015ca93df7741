//! # Parallax Bridge
//!
//! Moves data products and their provenance between two cooperating
//! processes over a point-to-point message channel.
//!
//! Messages are matched by tag. A tag combines the kind of message with a
//! small logical instance number, so that several coordinator pairs can share
//! one channel without their traffic interleaving.
//!
//! ## Features
//!
//! - **Fixed-size provenance records**: run, time window and unit of work
//! - **Trivial-copy transfer**: flat memory regions sent as-is, after an
//!   optional parameter message describing the allocation
//! - **Serialized transfer**: rkyv (or any custom [`Streamer`](product::Streamer)) blobs
//!   received after a size probe
//! - **Coordinators**: per-unit sender and receiver stages driven by a host pipeline
//! - **Links**: in-process (kanal), Unix domain sockets and TCP
//!
//! ## Quick Start
//!
//! ```rust
//! use parallax_bridge::prelude::*;
//!
//! let (left, right) = Channel::local_pair();
//! let instance = Instance::new(7)?;
//!
//! left.send_trivial_copy_product(instance, &vec![1u8, 2, 3])?;
//! let hits: Vec<u8> = right.receive_trivial_copy_product(instance)?;
//! assert_eq!(hits, vec![1, 2, 3]);
//! # Ok::<(), parallax_bridge::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod collection;
pub mod communicator;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod link;
pub mod observability;
pub mod product;
mod protocol;
pub mod provenance;
pub mod record;
pub mod tag;
pub mod token;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::channel::Channel;
    pub use crate::collection::{Column, PortableCollection, SoaLayout};
    pub use crate::config::{CoordinatorConfig, CoordinatorKind};
    pub use crate::coordinator::{
        ComputeQueue, ProductDescription, ProductStore, Receiver, Scope, Sender, UnitContext,
    };
    pub use crate::error::{Error, Result};
    pub use crate::product::{
        Capability, ProductId, ProductPattern, ProductType, RkyvStreamer, Streamer, TrivialCopy,
    };
    pub use crate::provenance::{RunProvenance, UnitProvenance, WindowProvenance};
    pub use crate::tag::{Instance, MessageKind, Tag};
    pub use crate::token::Token;
}

pub use channel::Channel;
pub use error::{Error, Result};
pub use token::Token;
