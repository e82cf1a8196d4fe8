//! The guarded decrement under contention: stock is conserved, overdraws
//! are refused, and the level never goes negative no matter how callers
//! interleave.

use std::sync::Arc;

use futures::future::join_all;
use proptest::collection::vec;
use proptest::prelude::*;

use orderflow::{
    CachePolicy, Category, NewProduct, Product, ProductCatalog, ProductId, ProductName, Quantity,
    ServiceError, UnitPrice,
};
use orderflow_memory::{MemoryCache, MemoryCollection};

type Catalog = ProductCatalog<MemoryCollection<Product>, MemoryCache>;

async fn catalog_with_stock(stock: u32) -> (Arc<Catalog>, ProductId) {
    let catalog = Arc::new(ProductCatalog::new(
        Arc::new(MemoryCollection::new()),
        Arc::new(MemoryCache::new()),
        CachePolicy::default(),
    ));
    let id = catalog
        .create_product(NewProduct {
            name: ProductName::try_new("Espresso beans").unwrap(),
            description: String::new(),
            category: Category::try_new("pantry").unwrap(),
            price: UnitPrice::try_new(18.5).unwrap(),
            stock,
        })
        .await
        .expect("seeding succeeds");
    (catalog, id)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_decrements_never_oversell() {
    let (catalog, beans) = catalog_with_stock(50).await;

    let tasks: Vec<_> = (0..100)
        .map(|_| {
            let catalog = Arc::clone(&catalog);
            let beans = beans.clone();
            tokio::spawn(async move {
                catalog
                    .decrease_stock(&beans, Quantity::try_new(2).unwrap())
                    .await
            })
        })
        .collect();

    let mut accepted = 0_u32;
    for outcome in join_all(tasks).await {
        match outcome.expect("task completes") {
            Ok(()) => accepted += 1,
            Err(ServiceError::InsufficientStock { requested, .. }) => {
                assert_eq!(requested, 2);
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(accepted, 25, "exactly the available stock was handed out");
    let remaining = catalog
        .get_product(&beans)
        .await
        .expect("product exists")
        .stock;
    assert_eq!(remaining, 0);
}

#[tokio::test]
async fn a_refused_decrement_leaves_stock_untouched() {
    let (catalog, beans) = catalog_with_stock(3).await;

    let err = catalog
        .decrease_stock(&beans, Quantity::try_new(4).unwrap())
        .await
        .expect_err("an overdraw is refused");
    assert!(matches!(
        err,
        ServiceError::InsufficientStock { requested: 4, .. }
    ));

    let remaining = catalog
        .get_product(&beans)
        .await
        .expect("product exists")
        .stock;
    assert_eq!(remaining, 3, "a refusal never clamps or partially applies");
}

#[tokio::test]
async fn a_decrement_against_a_vanished_product_reads_as_insufficient() {
    let (catalog, _) = catalog_with_stock(3).await;
    let ghost = ProductId::generate();

    let err = catalog
        .decrease_stock(&ghost, Quantity::try_new(1).unwrap())
        .await
        .expect_err("a missing product cannot be decremented");
    assert!(matches!(err, ServiceError::InsufficientStock { .. }));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Whatever the request sequence, the final stock is exactly the
    /// initial level minus what was accepted, and every refusal asked for
    /// more than remained at that moment.
    #[test]
    fn decrements_conserve_stock(initial in 0_u32..60, requests in vec(1_u32..6, 1..30)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime builds");
        rt.block_on(async move {
            let (catalog, beans) = catalog_with_stock(initial).await;

            let mut remaining = initial;
            for request in requests {
                let quantity = Quantity::try_new(request).expect("request is positive");
                match catalog.decrease_stock(&beans, quantity).await {
                    Ok(()) => {
                        prop_assert!(request <= remaining);
                        remaining -= request;
                    }
                    Err(ServiceError::InsufficientStock { requested, .. }) => {
                        prop_assert_eq!(requested, request);
                        prop_assert!(request > remaining);
                    }
                    Err(other) => {
                        prop_assert!(false, "unexpected error: {other}");
                    }
                }
            }

            let final_stock = catalog
                .get_product(&beans)
                .await
                .expect("product exists")
                .stock;
            prop_assert_eq!(final_stock, remaining);
            Ok(())
        })?;
    }
}
