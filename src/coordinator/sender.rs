use super::{ProductDescription, Scope, TransferBinding, TransferKind, UnitContext, token_id, validate};
use crate::config::CoordinatorConfig;
use crate::error::{Error, Result};
use crate::observability::{CoordinatorMetrics, TracingConfig, trace_error};
use crate::product::{ProductId, ProductPattern, ProductType};
use crate::tag::Instance;

/// One configured source product.
#[derive(Debug)]
struct Source {
    pattern: ProductPattern,
    product_type: ProductType,
    binding: Option<TransferBinding>,
    registered: bool,
}

impl Source {
    fn resolve(&mut self, id: &ProductId) -> Result<()> {
        match &self.binding {
            Some(binding) if binding.product != *id => Err(Error::Configuration(format!(
                "pattern {} matches both {} and {}",
                self.pattern, binding.product, id
            ))),
            Some(_) => Ok(()),
            None => {
                self.binding = Some(TransferBinding::new(id.clone(), self.product_type.clone()));
                Ok(())
            }
        }
    }
}

/// Sends a fixed list of products per unit of work.
///
/// Source products are selected by pattern. Exact patterns are bound at
/// construction; wildcard patterns are bound as the host pipeline registers
/// matching products through [`Sender::on_product_registered`].
#[derive(Debug)]
pub struct Sender {
    name: String,
    upstream: ProductId,
    token: ProductId,
    instance: Instance,
    sources: Vec<Source>,
    tracing: TracingConfig,
    metrics: CoordinatorMetrics,
}

impl Sender {
    /// Configure a sender with one product type per configured product.
    pub fn new(config: &CoordinatorConfig, slots: Vec<ProductType>) -> Result<Self> {
        let instance = validate(config, slots.len())?;

        let sources = config
            .products
            .iter()
            .zip(slots)
            .map(|(product, product_type)| {
                let pattern = product.pattern();
                let binding = pattern
                    .exact()
                    .map(|id| TransferBinding::new(id, product_type.clone()));
                Source {
                    pattern,
                    product_type,
                    binding,
                    registered: false,
                }
            })
            .collect();

        Ok(Self {
            name: config.name.clone(),
            upstream: config.upstream.clone(),
            token: token_id(config),
            instance,
            sources,
            tracing: TracingConfig::default(),
            metrics: CoordinatorMetrics::new(&config.name, "sender"),
        })
    }

    /// Replace the tracing configuration.
    pub fn with_tracing(mut self, tracing: TracingConfig) -> Self {
        self.tracing = tracing;
        self
    }

    /// The coordinator name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The validated instance.
    pub fn instance(&self) -> Instance {
        self.instance
    }

    /// Id of the republished token.
    pub fn token_id(&self) -> &ProductId {
        &self.token
    }

    /// Bindings resolved so far, in transfer order.
    pub fn bindings(&self) -> impl Iterator<Item = &TransferBinding> {
        self.sources.iter().filter_map(|source| source.binding.as_ref())
    }

    /// Handle a product announced by the host pipeline.
    ///
    /// Only unit-scoped products take part in matching, and a wildcard
    /// pattern only matches products of its declared type. Returns whether
    /// the product matched any configured pattern. An exact pattern naming a
    /// product of another type, or a wildcard pattern matching a second
    /// product, is a configuration error.
    pub fn on_product_registered(&mut self, description: &ProductDescription) -> Result<bool> {
        if description.scope != Scope::Unit {
            return Ok(false);
        }

        let mut matched = false;
        for source in &mut self.sources {
            if !source.pattern.matches(&description.id) {
                continue;
            }
            if source.product_type.type_name() != description.type_name {
                if source.pattern.is_wildcard() {
                    tracing::trace!(
                        sender = %self.name,
                        pattern = %source.pattern,
                        product = %description.id,
                        product_type = %description.type_name,
                        "skipping product of another type"
                    );
                    continue;
                }
                return Err(Error::Configuration(format!(
                    "{}: product {} is a {} but {} expects {}",
                    self.name,
                    description.id,
                    description.type_name,
                    source.pattern,
                    source.product_type.type_name()
                )));
            }
            source.resolve(&description.id)?;
            source.registered = true;
            matched = true;

            tracing::debug!(
                sender = %self.name,
                pattern = %source.pattern,
                product = %description.id,
                "matched source product"
            );
        }
        Ok(matched)
    }

    /// Patterns that no registered product has matched yet.
    pub fn unmatched(&self) -> Vec<&ProductPattern> {
        self.sources
            .iter()
            .filter(|source| !source.registered)
            .map(|source| &source.pattern)
            .collect()
    }

    /// Fail if any configured pattern was never matched by a registration.
    pub fn verify_registrations(&self) -> Result<()> {
        let unmatched = self.unmatched();
        if unmatched.is_empty() {
            return Ok(());
        }
        let patterns: Vec<String> = unmatched.iter().map(ToString::to_string).collect();
        Err(Error::Configuration(format!(
            "{}: no product matches {}",
            self.name,
            patterns.join(", ")
        )))
    }

    /// Send every bound product for one unit of work.
    pub fn produce(&self, unit: &mut dyn UnitContext) -> Result<()> {
        let span = self.tracing.coordinator_span(&self.name, "sender", self.instance);
        let _guard = span.enter();
        let _timer = self.metrics.start_timer();

        self.transfer(unit).inspect_err(|e| trace_error(&self.name, e))
    }

    fn transfer(&self, unit: &mut dyn UnitContext) -> Result<()> {
        let token = unit.token(&self.upstream)?;

        for source in &self.sources {
            let binding = source.binding.as_ref().ok_or_else(|| {
                Error::Configuration(format!(
                    "{}: no product resolved for {}",
                    self.name, source.pattern
                ))
            })?;

            let span = self
                .tracing
                .product_span(&binding.product.to_string(), binding.kind.as_str());
            let _guard = span.enter();

            let product = unit.product(&binding.product)?;
            if !binding.product_type.matches(product) {
                return Err(Error::ProductType {
                    expected: binding.product_type.type_name(),
                    binding: binding.product.to_string(),
                });
            }

            unit.queue().synchronize()?;
            binding
                .product_type
                .send(token.channel(), self.instance, product)?;
            self.metrics
                .record_product(binding.kind == TransferKind::Serialized);
        }

        unit.put_token(self.token.clone(), token)?;
        self.metrics.record_unit();
        Ok(())
    }
}
