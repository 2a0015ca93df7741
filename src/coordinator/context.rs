//! What a coordinator needs from the host pipeline for one unit of work.

use crate::error::{Error, Result};
use crate::product::{AnyProduct, ProductId};
use crate::token::Token;
use std::any::type_name;
use std::collections::HashMap;
use std::fmt;

/// A queue of asynchronous work that produced a unit's products.
pub trait ComputeQueue: Send + Sync {
    /// Block until all work submitted so far has completed.
    fn synchronize(&self) -> Result<()>;
}

/// A queue whose work is always complete: everything ran on the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostQueue;

impl ComputeQueue for HostQueue {
    fn synchronize(&self) -> Result<()> {
        Ok(())
    }
}

/// Access to one unit of work.
pub trait UnitContext {
    /// The token published under `id`.
    fn token(&self, id: &ProductId) -> Result<Token>;

    /// An already available product.
    fn product(&self, id: &ProductId) -> Result<&AnyProduct>;

    /// Make a product available downstream.
    fn put(&mut self, id: ProductId, product: Box<AnyProduct>) -> Result<()>;

    /// Publish a token downstream.
    fn put_token(&mut self, id: ProductId, token: Token) -> Result<()>;

    /// The queue that produced this unit's products.
    fn queue(&self) -> &dyn ComputeQueue;
}

/// Lifetime of a product in the host pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Produced once per unit of work.
    Unit,
    /// Produced once per time window.
    Window,
    /// Produced once per run.
    Run,
    /// Produced once per process.
    Process,
}

/// A product the host pipeline announces as it is registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductDescription {
    /// Product identity.
    pub id: ProductId,
    /// Rust type name of the product.
    pub type_name: String,
    /// Product lifetime.
    pub scope: Scope,
}

impl ProductDescription {
    /// Describe a product of type `T`.
    pub fn of<T: ?Sized>(id: ProductId, scope: Scope) -> Self {
        Self {
            id,
            type_name: type_name::<T>().to_string(),
            scope,
        }
    }
}

/// A [`UnitContext`] backed by hash maps.
///
/// Useful to embed coordinators in a program without a full pipeline, and in
/// tests.
pub struct ProductStore {
    products: HashMap<ProductId, Box<AnyProduct>>,
    tokens: HashMap<ProductId, Token>,
    queue: Box<dyn ComputeQueue>,
}

impl ProductStore {
    /// An empty store whose products all live on the host.
    pub fn new() -> Self {
        Self::with_queue(HostQueue)
    }

    /// An empty store whose products were produced by `queue`.
    pub fn with_queue(queue: impl ComputeQueue + 'static) -> Self {
        Self {
            products: HashMap::new(),
            tokens: HashMap::new(),
            queue: Box::new(queue),
        }
    }

    /// Add a product, replacing any previous one with the same id.
    pub fn insert<T: Send + Sync + 'static>(&mut self, id: ProductId, product: T) {
        self.products.insert(id, Box::new(product));
    }

    /// Add a token, replacing any previous one with the same id.
    pub fn insert_token(&mut self, id: ProductId, token: Token) {
        self.tokens.insert(id, token);
    }

    /// Borrow a product as `T`.
    pub fn get<T: 'static>(&self, id: &ProductId) -> Option<&T> {
        self.products.get(id)?.downcast_ref()
    }

    /// Remove a product and return it as `T`.
    ///
    /// The product stays in the store if it is not a `T`.
    pub fn take<T: 'static>(&mut self, id: &ProductId) -> Result<T> {
        let product = self
            .products
            .remove(id)
            .ok_or_else(|| Error::MissingProduct(id.to_string()))?;
        match product.downcast::<T>() {
            Ok(product) => Ok(*product),
            Err(product) => {
                self.products.insert(id.clone(), product);
                Err(Error::ProductType {
                    expected: type_name::<T>(),
                    binding: id.to_string(),
                })
            }
        }
    }

    /// Whether a product is stored under `id`.
    pub fn contains(&self, id: &ProductId) -> bool {
        self.products.contains_key(id)
    }

    /// Number of stored products, tokens excluded.
    pub fn len(&self) -> usize {
        self.products.len()
    }

    /// Whether no products are stored.
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Drop every product and token, keeping the queue.
    pub fn clear(&mut self) {
        self.products.clear();
        self.tokens.clear();
    }
}

impl Default for ProductStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProductStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut products: Vec<String> = self.products.keys().map(ToString::to_string).collect();
        products.sort();
        f.debug_struct("ProductStore")
            .field("products", &products)
            .field("tokens", &self.tokens.len())
            .finish()
    }
}

impl UnitContext for ProductStore {
    fn token(&self, id: &ProductId) -> Result<Token> {
        self.tokens
            .get(id)
            .cloned()
            .ok_or_else(|| Error::MissingProduct(format!("token {id}")))
    }

    fn product(&self, id: &ProductId) -> Result<&AnyProduct> {
        self.products
            .get(id)
            .map(|product| &**product)
            .ok_or_else(|| Error::MissingProduct(id.to_string()))
    }

    fn put(&mut self, id: ProductId, product: Box<AnyProduct>) -> Result<()> {
        if self.products.contains_key(&id) {
            return Err(Error::Configuration(format!("product {id} is produced twice")));
        }
        self.products.insert(id, product);
        Ok(())
    }

    fn put_token(&mut self, id: ProductId, token: Token) -> Result<()> {
        if self.tokens.contains_key(&id) {
            return Err(Error::Configuration(format!("token {id} is produced twice")));
        }
        self.tokens.insert(id, token);
        Ok(())
    }

    fn queue(&self) -> &dyn ComputeQueue {
        self.queue.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;

    #[test]
    fn test_store_products() {
        let mut store = ProductStore::new();
        let id = ProductId::new("hits", "");
        store.insert(id.clone(), vec![1u8, 2, 3]);

        assert!(store.contains(&id));
        assert_eq!(store.get::<Vec<u8>>(&id), Some(&vec![1, 2, 3]));
        assert!(store.get::<String>(&id).is_none());
        assert!(store.product(&id).unwrap().is::<Vec<u8>>());

        // Wrong type leaves the product in place
        assert!(matches!(store.take::<String>(&id), Err(Error::ProductType { .. })));
        assert_eq!(store.take::<Vec<u8>>(&id).unwrap(), vec![1, 2, 3]);
        assert!(matches!(store.take::<Vec<u8>>(&id), Err(Error::MissingProduct(_))));
    }

    #[test]
    fn test_put_twice_fails() {
        let mut store = ProductStore::new();
        let id = ProductId::new("recv", "hits");
        store.put(id.clone(), Box::new(1u32)).unwrap();
        assert!(store.put(id, Box::new(2u32)).is_err());
    }

    #[test]
    fn test_tokens() {
        let mut store = ProductStore::new();
        let (a, _b) = Channel::local_pair();
        let id = ProductId::new("source", "");
        assert!(matches!(store.token(&id), Err(Error::MissingProduct(_))));

        store.insert_token(id.clone(), Token::new(a));
        let token = store.token(&id).unwrap();
        store.put_token(ProductId::new("send", ""), token.clone()).unwrap();
        assert!(store.token(&ProductId::new("send", "")).unwrap().ptr_eq(&token));
    }

    #[test]
    fn test_host_queue() {
        let store = ProductStore::default();
        store.queue().synchronize().unwrap();
        assert_eq!(ProductDescription::of::<u32>(ProductId::new("a", ""), Scope::Unit).type_name, "u32");
    }
}
