//! Coordinator configuration.
//!
//! A coordinator is configured with a name, the upstream token it consumes,
//! a logical instance and an ordered list of products. Configurations are
//! built in code with the `with_*` builders, from a property map, or from a
//! one-line description:
//!
//! ```rust
//! use parallax_bridge::config::{CoordinatorConfig, CoordinatorKind};
//!
//! let (kind, config) = CoordinatorConfig::parse(
//!     r#"bridgesender name=send upstream=source:token instance=7 products="hits:,clusters:fractions""#,
//! ).unwrap();
//!
//! assert_eq!(kind, CoordinatorKind::Sender);
//! assert_eq!(config.instance, 7);
//! assert_eq!(config.products.len(), 2);
//! ```
//!
//! Values are only checked for shape here. Range checks (instance, product
//! count) happen when a coordinator is constructed.

mod parser;

pub use parser::{ParsedDescription, PropertyValue, parse_description};

use crate::error::{Error, Result};
use crate::product::{ProductId, ProductPattern};
use std::collections::HashMap;

/// Which side of a transfer a description configures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorKind {
    /// `bridgesender`
    Sender,
    /// `bridgereceiver`
    Receiver,
}

impl CoordinatorKind {
    /// Look up a kind by its description name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "bridgesender" => Some(CoordinatorKind::Sender),
            "bridgereceiver" => Some(CoordinatorKind::Receiver),
            _ => None,
        }
    }
}

/// One configured product.
///
/// For a sender, label and instance form the pattern of the source product.
/// For a receiver, the label names the product it puts downstream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductConfig {
    /// Producer label (sender) or output name (receiver).
    pub label: String,
    /// Product instance name.
    pub instance: String,
}

impl ProductConfig {
    /// Create a product entry.
    pub fn new(label: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            instance: instance.into(),
        }
    }

    /// The pattern a sender matches source products against.
    pub fn pattern(&self) -> ProductPattern {
        ProductPattern::new(&self.label, &self.instance)
    }
}

/// Configuration shared by senders and receivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Coordinator name; labels everything the coordinator produces.
    pub name: String,
    /// Token consumed to reach the channel.
    pub upstream: ProductId,
    /// Logical instance, validated at construction.
    pub instance: i64,
    /// Products, in transfer order.
    pub products: Vec<ProductConfig>,
}

impl CoordinatorConfig {
    /// Create a configuration with no products and instance 0 (invalid until set).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            upstream: ProductId::default(),
            instance: 0,
            products: Vec::new(),
        }
    }

    /// Set the upstream token.
    pub fn with_upstream(mut self, upstream: ProductId) -> Self {
        self.upstream = upstream;
        self
    }

    /// Set the logical instance.
    pub fn with_instance(mut self, instance: i64) -> Self {
        self.instance = instance;
        self
    }

    /// Append a product.
    pub fn with_product(mut self, label: impl Into<String>, instance: impl Into<String>) -> Self {
        self.products.push(ProductConfig::new(label, instance));
        self
    }

    /// Build from a property map.
    ///
    /// Recognized properties: `name` (overrides `name`), `upstream`
    /// (`label:instance`), `instance` (integer) and `products` (comma
    /// separated `label:instance` list). `upstream` and `instance` are
    /// required.
    pub fn from_properties(name: &str, properties: &HashMap<String, PropertyValue>) -> Result<Self> {
        if let Some(unknown) = properties
            .keys()
            .find(|key| !matches!(key.as_str(), "name" | "upstream" | "instance" | "products"))
        {
            return Err(Error::Configuration(format!(
                "{name}: unknown property '{unknown}'"
            )));
        }

        let name = properties
            .get("name")
            .map(PropertyValue::as_string)
            .unwrap_or_else(|| name.to_string());

        let upstream = properties
            .get("upstream")
            .ok_or_else(|| Error::Configuration(format!("{name}: missing property 'upstream'")))
            .and_then(|value| ProductId::parse(&value.as_string()))?;

        let instance = properties
            .get("instance")
            .ok_or_else(|| Error::Configuration(format!("{name}: missing property 'instance'")))?
            .as_i64()
            .ok_or_else(|| Error::Configuration(format!("{name}: 'instance' must be an integer")))?;

        let products = match properties.get("products") {
            Some(value) => parse_products(&value.as_string())?,
            None => Vec::new(),
        };

        Ok(Self {
            name,
            upstream,
            instance,
            products,
        })
    }

    /// Parse a one-line description into its kind and configuration.
    pub fn parse(description: &str) -> Result<(CoordinatorKind, Self)> {
        let parsed = parse_description(description)?;
        let kind = CoordinatorKind::from_name(&parsed.kind).ok_or_else(|| {
            Error::Configuration(format!("unknown coordinator kind: {}", parsed.kind))
        })?;
        let properties: HashMap<String, PropertyValue> = parsed.properties.into_iter().collect();
        Ok((kind, Self::from_properties(&parsed.kind, &properties)?))
    }
}

fn parse_products(list: &str) -> Result<Vec<ProductConfig>> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (label, instance) = entry.split_once(':').unwrap_or((entry, ""));
            if label.is_empty() {
                return Err(Error::Configuration(format!(
                    "product '{entry}' has an empty label"
                )));
            }
            Ok(ProductConfig::new(label, instance))
        })
        .collect()
}
