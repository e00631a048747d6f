//! Order aggregate returned to callers.

use chrono::{DateTime, SecondsFormat, Utc};
use common::{Money, OrderId, OrderStatus, ProductId};
use order_store::{OrderProductRow, OrderRow};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Result;

/// A line item enriched with catalog data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetail {
    pub id: ProductId,
    pub name: String,
    pub product_code: Uuid,
    /// Unit price captured when the line item was created.
    pub price: Money,
    pub amount: u32,
    /// `price * amount`.
    pub total_price: Money,
}

/// An order with its line items, as returned by every read and create path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAggregate {
    pub id: OrderId,
    pub comment: String,
    pub user_id: String,
    pub staff_id: String,
    pub order_cost: Money,
    pub status: OrderStatus,
    /// RFC 3339, second precision.
    pub creation_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_date: Option<String>,
    pub products: Vec<ProductDetail>,
}

impl OrderAggregate {
    /// Sums the line item totals.
    pub fn products_total(&self) -> Result<Money> {
        Ok(Money::checked_sum(self.products.iter().map(|p| p.total_price))?)
    }
}

fn rfc3339(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Enriches one stored line item with its total.
pub fn build_product_detail(line: &OrderProductRow) -> Result<ProductDetail> {
    Ok(ProductDetail {
        id: line.product_id,
        name: line.product_name.clone(),
        product_code: line.product_code,
        price: line.result_price,
        amount: line.amount,
        total_price: line.result_price.checked_mul(line.amount)?,
    })
}

/// Enriches stored line items with their totals, keeping their order.
pub fn build_product_details(products: &[OrderProductRow]) -> Result<Vec<ProductDetail>> {
    products.iter().map(build_product_detail).collect()
}

/// Assembles the aggregate for an order and its line items.
///
/// Pure: the same rows always produce the same aggregate. The only failure
/// is arithmetic overflow.
pub fn build_order_aggregate(
    order: &OrderRow,
    products: &[OrderProductRow],
) -> Result<OrderAggregate> {
    Ok(OrderAggregate {
        id: order.id,
        comment: order.comment.clone(),
        user_id: order.user_id.clone(),
        staff_id: order.staff_id.clone(),
        order_cost: order.order_cost,
        status: order.status,
        creation_date: rfc3339(order.creation_date),
        finish_date: order.finish_date.map(rfc3339),
        products: build_product_details(products)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn order_row() -> OrderRow {
        OrderRow {
            id: OrderId::new(),
            comment: "fragile".into(),
            user_id: "user".into(),
            staff_id: "staff".into(),
            order_cost: Money::from_minor(10250),
            status: OrderStatus::Completed,
            creation_date: Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap(),
            finish_date: Some(Utc.with_ymd_and_hms(2024, 3, 2, 8, 0, 5).unwrap()),
        }
    }

    fn line(order_id: OrderId, name: &str, minor: i64, amount: u32) -> OrderProductRow {
        OrderProductRow {
            order_id,
            product_id: ProductId::new(),
            result_price: Money::from_minor(minor),
            amount,
            product_name: name.into(),
            product_code: Uuid::new_v4(),
        }
    }

    #[test]
    fn builds_totals_and_timestamps() {
        let order = order_row();
        let lines = vec![line(order.id, "P1", 5000, 2), line(order.id, "P2", 125, 2)];

        let aggregate = build_order_aggregate(&order, &lines).unwrap();

        assert_eq!(aggregate.creation_date, "2024-03-01T12:30:00Z");
        assert_eq!(aggregate.finish_date.as_deref(), Some("2024-03-02T08:00:05Z"));
        assert_eq!(aggregate.products[0].total_price, Money::from_minor(10000));
        assert_eq!(aggregate.products[1].total_price, Money::from_minor(250));
        assert_eq!(aggregate.products_total().unwrap(), aggregate.order_cost);
        assert_eq!(aggregate.products[0].name, "P1");
    }

    #[test]
    fn building_twice_is_identical() {
        let order = order_row();
        let lines = vec![line(order.id, "P1", 5000, 2)];
        assert_eq!(
            build_order_aggregate(&order, &lines).unwrap(),
            build_order_aggregate(&order, &lines).unwrap()
        );
    }

    #[test]
    fn overflow_is_the_only_failure() {
        let order = order_row();
        let mut huge = line(order.id, "P1", 0, 2);
        huge.result_price = "79228162514264337593543950335".parse().unwrap();
        assert!(build_order_aggregate(&order, &[huge]).is_err());
    }

    #[test]
    fn open_order_omits_finish_date_on_the_wire() {
        let mut order = order_row();
        order.finish_date = None;
        let aggregate = build_order_aggregate(&order, &[]).unwrap();
        let json = serde_json::to_value(&aggregate).unwrap();
        assert!(json.get("finish_date").is_none());
        assert_eq!(json["order_cost"], "102.50");
        assert_eq!(json["status"], "completed");
    }
}
