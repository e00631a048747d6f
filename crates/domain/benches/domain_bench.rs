use chrono::Utc;
use common::{Money, OrderId, OrderStatus, ProductId};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use domain::{OrderCreateRequest, OrderProductInput, build_order_aggregate};
use order_store::{OrderProductRow, OrderRow};
use uuid::Uuid;

fn order_with_lines(count: u32) -> (OrderRow, Vec<OrderProductRow>) {
    let order = OrderRow {
        id: OrderId::new(),
        comment: "benchmark".to_string(),
        user_id: "user".to_string(),
        staff_id: "staff".to_string(),
        order_cost: Money::zero(),
        status: OrderStatus::New,
        creation_date: Utc::now(),
        finish_date: None,
    };
    let lines = (1..=count)
        .map(|i| OrderProductRow {
            order_id: order.id,
            product_id: ProductId::new(),
            result_price: Money::from_minor(i64::from(i) * 199),
            amount: i,
            product_name: format!("Product {i}"),
            product_code: Uuid::new_v4(),
        })
        .collect();
    (order, lines)
}

fn bench_build_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("domain/build_order_aggregate");
    for count in [1u32, 10, 100] {
        let (order, lines) = order_with_lines(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &lines, |b, lines| {
            b.iter(|| build_order_aggregate(&order, lines).unwrap());
        });
    }
    group.finish();
}

fn bench_validate_request(c: &mut Criterion) {
    let request = OrderCreateRequest::new(
        (1..=50)
            .map(|i| OrderProductInput::new(ProductId::new(), i))
            .collect(),
    );

    c.bench_function("domain/validate_50_line_items", |b| {
        b.iter(|| request.validate().unwrap());
    });
}

criterion_group!(benches, bench_build_aggregate, bench_validate_request);
criterion_main!(benches);
