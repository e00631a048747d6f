//! Builds aggregates from rows written through the in-memory store.

use common::Money;
use domain::{
    DomainError, OrderCreateRequest, OrderProductInput, OrderUpdateRequest, build_order_aggregate,
};
use order_store::{
    InMemoryOrderStore, NewProduct, OrderRepository, OrderStatus, ProductCatalog, ProductRow,
};
use uuid::Uuid;

async fn seed(store: &InMemoryOrderStore, name: &str, minor: i64) -> ProductRow {
    store
        .create_product(NewProduct {
            name: name.to_string(),
            product_code: Uuid::new_v4(),
            customer_cost: Money::from_minor(minor),
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn request_to_aggregate() {
    let store = InMemoryOrderStore::new();
    let p1 = seed(&store, "P1", 5000).await;
    let p2 = seed(&store, "P2", 1999).await;

    let request = OrderCreateRequest::new(vec![
        OrderProductInput::new(p1.id, 2),
        OrderProductInput::new(p2.id, 1),
    ])
    .with_comment("second floor");
    request.validate().unwrap();

    let row = store
        .create_with_products(request.to_new_order(), request.line_items())
        .await
        .unwrap();
    let lines = store.get_order_products(row.id).await.unwrap();
    let aggregate = build_order_aggregate(&row, &lines).unwrap();

    assert_eq!(aggregate.order_cost, Money::from_minor(11999));
    assert_eq!(aggregate.products_total().unwrap(), aggregate.order_cost);
    assert_eq!(aggregate.products.len(), 2);
    assert_eq!(aggregate.products[0].product_code, p1.product_code);
    assert_eq!(aggregate.comment, "second floor");
    assert_eq!(aggregate.status, OrderStatus::New);
    assert!(aggregate.finish_date.is_none());
}

#[tokio::test]
async fn update_request_drives_lifecycle() {
    let store = InMemoryOrderStore::new();
    let p1 = seed(&store, "P1", 100).await;
    let request = OrderCreateRequest::new(vec![OrderProductInput::new(p1.id, 1)]);
    let row = store
        .create_with_products(request.to_new_order(), request.line_items())
        .await
        .unwrap();

    let start = OrderUpdateRequest {
        status: Some(OrderStatus::Processing),
        ..Default::default()
    };
    start.validate(row.status).unwrap();
    let row = store.update(row.id, start.into_update()).await.unwrap();

    let back = OrderUpdateRequest {
        status: Some(OrderStatus::New),
        ..Default::default()
    };
    assert!(matches!(
        back.validate(row.status),
        Err(DomainError::InvalidStatusTransition { .. })
    ));

    let finish = OrderUpdateRequest {
        status: Some(OrderStatus::Completed),
        comment: Some("handed over".into()),
    };
    finish.validate(row.status).unwrap();
    let row = store.update(row.id, finish.into_update()).await.unwrap();

    let aggregate = build_order_aggregate(&row, &[]).unwrap();
    assert_eq!(aggregate.status, OrderStatus::Completed);
    assert!(aggregate.finish_date.is_some());
    assert_eq!(aggregate.comment, "handed over");
}
