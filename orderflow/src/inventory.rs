//! Product catalog: products, stock, and the [`ProductCatalog`] service.
//!
//! Stock is a `u32` and every decrement goes through one atomic conditional
//! update, so stock can never go negative: an overdraw is refused with
//! [`ServiceError::InsufficientStock`], never clamped. Product reads are
//! served cache-aside under `product:{id}`; every product write invalidates
//! that key before returning.

use std::sync::Arc;

use nutype::nutype;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::cache::{self, Cache, CacheKey, CachePolicy};
use crate::errors::{ServiceError, ServiceResult};
use crate::store::{Document, DocumentQuery, DocumentStore};
use crate::types::{ProductId, Quantity, UnitPrice};

/// Display name of a product; non-empty, at most 256 characters.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 256),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct ProductName(String);

/// Catalog category a product is filed under; non-empty, at most 128
/// characters.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 128),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct Category(String);

/// A catalog product with its current stock level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Store-assigned id; `None` until inserted.
    pub id: Option<ProductId>,
    /// Display name.
    pub name: ProductName,
    /// Free-form description; may be empty.
    pub description: String,
    /// Category for listing.
    pub category: Category,
    /// Current price per unit.
    pub price: UnitPrice,
    /// Units on hand. Unsigned: negative stock is unrepresentable.
    pub stock: u32,
}

impl Document for Product {
    type Id = ProductId;
    const COLLECTION: &'static str = "products";

    fn generate_id() -> ProductId {
        ProductId::generate()
    }

    fn id(&self) -> Option<&ProductId> {
        self.id.as_ref()
    }

    fn set_id(&mut self, id: ProductId) {
        self.id = Some(id);
    }
}

/// Validated input for creating or fully replacing a product.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    /// Display name.
    pub name: ProductName,
    /// Free-form description; may be empty.
    pub description: String,
    /// Category for listing.
    pub category: Category,
    /// Price per unit.
    pub price: UnitPrice,
    /// Initial (or replacement) stock level.
    pub stock: u32,
}

/// Query: a page of the catalog, optionally restricted to one category,
/// sorted by name.
#[derive(Debug, Clone)]
pub struct ProductsByCategory {
    category: Option<Category>,
    limit: usize,
    offset: usize,
}

impl ProductsByCategory {
    /// Page of one category.
    pub const fn of(category: Category, limit: usize, offset: usize) -> Self {
        Self {
            category: Some(category),
            limit,
            offset,
        }
    }

    /// Page across all categories.
    pub const fn any(limit: usize, offset: usize) -> Self {
        Self {
            category: None,
            limit,
            offset,
        }
    }
}

impl DocumentQuery<Product> for ProductsByCategory {
    fn matches(&self, product: &Product) -> bool {
        self.category
            .as_ref()
            .map_or(true, |category| &product.category == category)
    }

    fn arrange(&self, mut products: Vec<Product>) -> Vec<Product> {
        products.sort_by(|a, b| a.name.cmp(&b.name));
        products
            .into_iter()
            .skip(self.offset)
            .take(self.limit)
            .collect()
    }
}

/// Authority over products and their stock.
pub struct ProductCatalog<S, C> {
    products: Arc<S>,
    cache: Arc<C>,
    policy: CachePolicy,
}

impl<S, C> ProductCatalog<S, C>
where
    S: DocumentStore<Doc = Product>,
    C: Cache,
{
    /// Creates the catalog over its collaborators.
    pub const fn new(products: Arc<S>, cache: Arc<C>, policy: CachePolicy) -> Self {
        Self {
            products,
            cache,
            policy,
        }
    }

    /// Adds a product to the catalog.
    #[instrument(skip(self, fields), fields(name = %fields.name))]
    pub async fn create_product(&self, fields: NewProduct) -> ServiceResult<ProductId> {
        let product = Product {
            id: None,
            name: fields.name,
            description: fields.description,
            category: fields.category,
            price: fields.price,
            stock: fields.stock,
        };
        let id = self
            .products
            .insert(product)
            .await
            .map_err(|e| ServiceError::from_store("product", e))?;
        info!(product = %id, "product created");
        Ok(id)
    }

    /// Fetches one product cache-aside under `product:{id}`.
    #[instrument(skip(self))]
    pub async fn get_product(&self, id: &ProductId) -> ServiceResult<Product> {
        let key = CacheKey::product(id);
        cache::read_through(
            self.cache.as_ref(),
            &key,
            self.policy.entity_ttl,
            self.policy.op_timeout,
            || async {
                self.products
                    .find_by_id(id)
                    .await
                    .map_err(|e| ServiceError::from_store("product", e))?
                    .ok_or_else(|| ServiceError::NotFound {
                        entity: "product",
                        id: id.to_string(),
                    })
            },
        )
        .await
    }

    /// Lists a page of the catalog straight from the store.
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        category: Option<Category>,
        limit: usize,
        offset: usize,
    ) -> ServiceResult<Vec<Product>> {
        let query = match category {
            Some(category) => ProductsByCategory::of(category, limit, offset),
            None => ProductsByCategory::any(limit, offset),
        };
        self.products
            .find(&query)
            .await
            .map_err(|e| ServiceError::from_store("product", e))
    }

    /// Replaces every field of a product, keeping its id and invalidating
    /// its cache entry before returning.
    #[instrument(skip(self, fields), fields(product = %id))]
    pub async fn update_product(&self, id: &ProductId, fields: NewProduct) -> ServiceResult<()> {
        let updated = self
            .products
            .update_where(id, &|_| true, &mut |product| {
                product.name = fields.name.clone();
                product.description = fields.description.clone();
                product.category = fields.category.clone();
                product.price = fields.price;
                product.stock = fields.stock;
            })
            .await
            .map_err(|e| ServiceError::from_store("product", e))?;

        if updated == 0 {
            return Err(ServiceError::NotFound {
                entity: "product",
                id: id.to_string(),
            });
        }

        cache::invalidate(
            self.cache.as_ref(),
            &CacheKey::product(id),
            self.policy.op_timeout,
        )
        .await;
        info!(product = %id, "product updated");
        Ok(())
    }

    /// Removes a product, invalidating its cache entry.
    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: &ProductId) -> ServiceResult<()> {
        let deleted = self
            .products
            .delete(id)
            .await
            .map_err(|e| ServiceError::from_store("product", e))?;

        if deleted == 0 {
            return Err(ServiceError::NotFound {
                entity: "product",
                id: id.to_string(),
            });
        }

        cache::invalidate(
            self.cache.as_ref(),
            &CacheKey::product(id),
            self.policy.op_timeout,
        )
        .await;
        info!(product = %id, "product deleted");
        Ok(())
    }

    /// Removes `quantity` units of stock, atomically and only if enough
    /// remain.
    ///
    /// The check and the decrement are one conditional update; concurrent
    /// callers can never interleave between them. A refused decrement, or a
    /// product that vanished since the caller last looked, reports
    /// [`ServiceError::InsufficientStock`] and leaves stock untouched.
    #[instrument(skip(self), fields(product = %id, requested = u32::from(quantity)))]
    pub async fn decrease_stock(&self, id: &ProductId, quantity: Quantity) -> ServiceResult<()> {
        let requested = u32::from(quantity);
        let updated = self
            .products
            .update_where(
                id,
                &|product: &Product| product.stock >= requested,
                &mut |product| product.stock -= requested,
            )
            .await
            .map_err(|e| ServiceError::from_store("product", e))?;

        if updated == 0 {
            return Err(ServiceError::InsufficientStock {
                product: id.clone(),
                requested,
            });
        }

        cache::invalidate(
            self.cache.as_ref(),
            &CacheKey::product(id),
            self.policy.op_timeout,
        )
        .await;
        info!(product = %id, requested, "stock decremented");
        Ok(())
    }
}
