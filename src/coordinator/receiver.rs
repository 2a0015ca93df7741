use super::{TransferBinding, TransferKind, UnitContext, token_id, validate};
use crate::config::CoordinatorConfig;
use crate::error::Result;
use crate::observability::{CoordinatorMetrics, TracingConfig, trace_error};
use crate::product::{ProductId, ProductType};
use crate::tag::Instance;

/// Receives a fixed list of products per unit of work.
///
/// Received products are put under `<name>:<label>`, and the upstream token
/// is republished under `<name>:`.
#[derive(Debug)]
pub struct Receiver {
    name: String,
    upstream: ProductId,
    token: ProductId,
    instance: Instance,
    bindings: Vec<TransferBinding>,
    tracing: TracingConfig,
    metrics: CoordinatorMetrics,
}

impl Receiver {
    /// Configure a receiver with one product type per configured product.
    pub fn new(config: &CoordinatorConfig, slots: Vec<ProductType>) -> Result<Self> {
        let instance = validate(config, slots.len())?;

        let bindings: Vec<TransferBinding> = config
            .products
            .iter()
            .zip(slots)
            .map(|(product, product_type)| {
                TransferBinding::new(ProductId::new(&config.name, &product.label), product_type)
            })
            .collect();

        for binding in &bindings {
            tracing::debug!(
                receiver = %config.name,
                product = %binding.product,
                product_type = binding.product_type.type_name(),
                transfer = binding.kind.as_str(),
                instance = %instance,
                "configured receive"
            );
        }

        Ok(Self {
            name: config.name.clone(),
            upstream: config.upstream.clone(),
            token: token_id(config),
            instance,
            bindings,
            tracing: TracingConfig::default(),
            metrics: CoordinatorMetrics::new(&config.name, "receiver"),
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

    /// The bindings, in transfer order.
    pub fn bindings(&self) -> &[TransferBinding] {
        &self.bindings
    }

    /// Id of the republished token.
    pub fn token_id(&self) -> &ProductId {
        &self.token
    }

    /// Receive every bound product for one unit of work.
    ///
    /// Products are put into `unit` only after all of them were received, so
    /// a failed unit publishes nothing.
    pub fn produce(&self, unit: &mut dyn UnitContext) -> Result<()> {
        let span = self.tracing.coordinator_span(&self.name, "receiver", self.instance);
        let _guard = span.enter();
        let _timer = self.metrics.start_timer();

        self.transfer(unit).inspect_err(|e| trace_error(&self.name, e))
    }

    fn transfer(&self, unit: &mut dyn UnitContext) -> Result<()> {
        let token = unit.token(&self.upstream)?;

        // Nothing is published unless every receive succeeds.
        let mut received = Vec::with_capacity(self.bindings.len());
        for binding in &self.bindings {
            let span = self
                .tracing
                .product_span(&binding.product.to_string(), binding.kind.as_str());
            let _guard = span.enter();

            let product = binding
                .product_type
                .receive(token.channel(), self.instance)?;
            self.metrics
                .record_product(binding.kind == TransferKind::Serialized);
            received.push((binding.product.clone(), product));
        }

        for (id, product) in received {
            unit.put(id, product)?;
        }

        // Downstream consumers of this token run after the receives.
        unit.put_token(self.token.clone(), token)?;
        self.metrics.record_unit();
        Ok(())
    }
}
