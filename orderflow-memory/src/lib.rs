//! In-memory implementations of the orderflow ports.
//!
//! Everything the `orderflow` services need from the outside world has an
//! adapter here: a document store with unique indexes and atomic
//! conditional updates, a TTL cache, an at-least-once event bus with
//! redelivery and a delivery cap, a fulfillment log, and credential
//! fakes. Together they run the whole order pipeline in a single process,
//! which is how the integration tests and benchmarks drive it.
//!
//! The adapters are faithful to the awkward parts of their real
//! counterparts on purpose. The bus redelivers unacked messages and drops
//! them at a cap; the cache expires entries and can be wired to fail; the
//! store refuses conditional updates whose guard does not hold. Tests
//! against these adapters therefore cover the failure paths the ports are
//! designed around, not just the happy ones.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use orderflow::{
//!     CachePolicy, Category, NewProduct, Product, ProductCatalog, ProductName, UnitPrice,
//! };
//! use orderflow_memory::{MemoryCache, MemoryCollection};
//!
//! # async fn demo() -> orderflow::ServiceResult<()> {
//! let products: Arc<MemoryCollection<Product>> = Arc::new(MemoryCollection::new());
//! let cache = Arc::new(MemoryCache::new());
//! let catalog = ProductCatalog::new(products, cache, CachePolicy::default());
//!
//! let id = catalog
//!     .create_product(NewProduct {
//!         name: ProductName::try_new("Espresso beans").expect("valid name"),
//!         description: "Dark roast, 1kg".to_string(),
//!         category: Category::try_new("pantry").expect("valid category"),
//!         price: UnitPrice::try_new(18.5).expect("valid price"),
//!         stock: 40,
//!     })
//!     .await?;
//! let product = catalog.get_product(&id).await?;
//! assert_eq!(product.stock, 40);
//! # Ok(())
//! # }
//! ```

mod bus;
mod cache;
mod credentials;
mod fulfillment;
mod store;

pub use bus::{MemoryBusConfig, MemoryEventBus};
pub use cache::MemoryCache;
pub use credentials::{PlainTextHasher, StaticTokenIssuer};
pub use fulfillment::MemoryFulfillmentLog;
pub use store::MemoryCollection;
