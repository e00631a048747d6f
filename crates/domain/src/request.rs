//! Requests accepted by the order service.

use std::collections::HashSet;

use common::{Money, OrderStatus, ProductId};
use order_store::{NewOrder, NewOrderProduct, NewProduct, OrderUpdate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{DomainError, Result};

/// Principal recorded as user and staff when the caller supplies none.
pub const ANONYMOUS_PRINCIPAL: &str = "000000000000000000000000";

/// Longest accepted order comment, in characters.
pub const MAX_COMMENT_LEN: usize = 500;

fn anonymous() -> String {
    ANONYMOUS_PRINCIPAL.to_string()
}

/// One requested line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderProductInput {
    #[serde(rename = "uuid", alias = "product_id")]
    pub product_id: ProductId,
    pub amount: u32,
}

impl OrderProductInput {
    pub fn new(product_id: ProductId, amount: u32) -> Self {
        Self { product_id, amount }
    }
}

/// Request to create an order with its line items.
///
/// An absent or zero `order_cost` means the total is computed from catalog
/// prices; any other value must match that total exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreateRequest {
    #[serde(default)]
    pub comment: String,
    #[serde(default = "anonymous")]
    pub user_id: String,
    #[serde(default = "anonymous")]
    pub staff_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_cost: Option<Money>,
    #[serde(default)]
    pub products: Vec<OrderProductInput>,
}

impl OrderCreateRequest {
    /// Creates an anonymous request for the given line items.
    pub fn new(products: Vec<OrderProductInput>) -> Self {
        Self {
            comment: String::new(),
            user_id: anonymous(),
            staff_id: anonymous(),
            order_cost: None,
            products,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn with_order_cost(mut self, cost: Money) -> Self {
        self.order_cost = Some(cost);
        self
    }

    /// The cost handed to the store: zero when the caller supplied none.
    pub fn supplied_cost(&self) -> Money {
        self.order_cost.unwrap_or_default()
    }

    /// Checks the request shape without consulting the catalog.
    pub fn validate(&self) -> Result<()> {
        if self.products.is_empty() {
            return Err(DomainError::EmptyOrder);
        }

        let mut seen = HashSet::with_capacity(self.products.len());
        for item in &self.products {
            if item.amount == 0 {
                return Err(DomainError::InvalidAmount {
                    product_id: item.product_id,
                    amount: item.amount,
                });
            }
            if !seen.insert(item.product_id) {
                return Err(DomainError::DuplicateProduct(item.product_id));
            }
        }

        if let Some(cost) = self.order_cost
            && cost.is_negative()
        {
            return Err(DomainError::NegativeOrderCost(cost));
        }

        let len = self.comment.chars().count();
        if len > MAX_COMMENT_LEN {
            return Err(DomainError::CommentTooLong {
                len,
                max: MAX_COMMENT_LEN,
            });
        }

        Ok(())
    }

    /// Builds the order header for the store.
    pub fn to_new_order(&self) -> NewOrder {
        NewOrder {
            comment: self.comment.clone(),
            user_id: self.user_id.clone(),
            staff_id: self.staff_id.clone(),
            order_cost: self.supplied_cost(),
        }
    }

    /// Builds a header with zero cost, used for orders whose line items are
    /// appended one at a time.
    pub fn to_naked_order(&self) -> NewOrder {
        NewOrder {
            order_cost: Money::zero(),
            ..self.to_new_order()
        }
    }

    /// Builds the line items for the store.
    pub fn line_items(&self) -> Vec<NewOrderProduct> {
        self.products
            .iter()
            .map(|item| NewOrderProduct::new(item.product_id, item.amount))
            .collect()
    }
}

/// Request to update an order header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdateRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
}

impl OrderUpdateRequest {
    /// Checks the update against the order's current status.
    pub fn validate(&self, current: OrderStatus) -> Result<()> {
        if let Some(comment) = &self.comment {
            let len = comment.chars().count();
            if len > MAX_COMMENT_LEN {
                return Err(DomainError::CommentTooLong {
                    len,
                    max: MAX_COMMENT_LEN,
                });
            }
        }
        if let Some(next) = self.status
            && !current.can_transition_to(next)
        {
            return Err(DomainError::InvalidStatusTransition {
                from: current,
                to: next,
            });
        }
        Ok(())
    }

    pub fn into_update(self) -> OrderUpdate {
        OrderUpdate {
            comment: self.comment,
            status: self.status,
            order_cost: None,
        }
    }
}

/// Request to add a product to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCreateRequest {
    pub name: String,
    pub product_code: Uuid,
    pub customer_cost: Money,
    /// Stock to register with the inventory service for the new product.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_stock: Option<u64>,
}

impl ProductCreateRequest {
    pub fn validate(&self) -> Result<()> {
        let len = self.name.trim().chars().count();
        if !(2..=80).contains(&len) {
            return Err(DomainError::InvalidProduct(format!(
                "name must be 2 to 80 characters, got {len}"
            )));
        }
        if self.customer_cost.is_negative() || self.customer_cost.is_zero() {
            return Err(DomainError::InvalidProduct(
                "customer cost must be positive".to_string(),
            ));
        }
        if !self.customer_cost.is_whole_cents() {
            return Err(DomainError::InvalidProduct(format!(
                "customer cost {} has more than two decimal places",
                self.customer_cost.amount()
            )));
        }
        Ok(())
    }

    pub fn into_new_product(self) -> NewProduct {
        NewProduct {
            name: self.name.trim().to_string(),
            product_code: self.product_code,
            customer_cost: self.customer_cost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(amount: u32) -> OrderProductInput {
        OrderProductInput::new(ProductId::new(), amount)
    }

    #[test]
    fn empty_request_is_rejected() {
        let req = OrderCreateRequest::new(vec![]);
        assert!(matches!(req.validate(), Err(DomainError::EmptyOrder)));
    }

    #[test]
    fn zero_amount_is_rejected() {
        let req = OrderCreateRequest::new(vec![item(0)]);
        assert!(matches!(
            req.validate(),
            Err(DomainError::InvalidAmount { amount: 0, .. })
        ));
    }

    #[test]
    fn duplicate_products_are_rejected() {
        let first = item(1);
        let req = OrderCreateRequest::new(vec![first, OrderProductInput::new(first.product_id, 3)]);
        assert!(matches!(
            req.validate(),
            Err(DomainError::DuplicateProduct(id)) if id == first.product_id
        ));
    }

    #[test]
    fn negative_cost_is_rejected() {
        let req = OrderCreateRequest::new(vec![item(1)]).with_order_cost("-1".parse().unwrap());
        assert!(matches!(req.validate(), Err(DomainError::NegativeOrderCost(_))));
    }

    #[test]
    fn long_comment_is_rejected() {
        let req = OrderCreateRequest::new(vec![item(1)]).with_comment("x".repeat(501));
        assert!(matches!(req.validate(), Err(DomainError::CommentTooLong { .. })));
    }

    #[test]
    fn valid_request_passes() {
        let req = OrderCreateRequest::new(vec![item(2), item(1)]).with_comment("gift wrap");
        assert!(req.validate().is_ok());
        assert_eq!(req.line_items().len(), 2);
        assert!(req.to_new_order().order_cost.is_zero());
    }

    #[test]
    fn naked_order_drops_supplied_cost() {
        let req = OrderCreateRequest::new(vec![item(2)]).with_order_cost(Money::from_minor(100));
        assert_eq!(req.to_new_order().order_cost, Money::from_minor(100));
        assert!(req.to_naked_order().order_cost.is_zero());
    }

    #[test]
    fn wire_format_defaults_principals() {
        let id = ProductId::new();
        let json = format!(r#"{{"comment":"hi","products":[{{"uuid":"{id}","amount":2}}]}}"#);
        let req: OrderCreateRequest = serde_json::from_str(&json).unwrap();

        assert_eq!(req.user_id, ANONYMOUS_PRINCIPAL);
        assert_eq!(req.staff_id, ANONYMOUS_PRINCIPAL);
        assert_eq!(req.order_cost, None);
        assert_eq!(req.products, vec![OrderProductInput::new(id, 2)]);
    }

    #[test]
    fn wire_format_accepts_cost_and_product_id_alias() {
        let id = ProductId::new();
        let json = format!(
            r#"{{"products":[{{"product_id":"{id}","amount":1}}],"order_cost":"100.00","user_id":"u-7"}}"#
        );
        let req: OrderCreateRequest = serde_json::from_str(&json).unwrap();

        assert_eq!(req.order_cost, Some(Money::from_minor(10000)));
        assert_eq!(req.user_id, "u-7");
        assert_eq!(req.products[0].product_id, id);
    }

    #[test]
    fn update_respects_status_transitions() {
        let to_completed = OrderUpdateRequest {
            status: Some(OrderStatus::Completed),
            ..Default::default()
        };
        assert!(to_completed.validate(OrderStatus::Processing).is_ok());
        assert!(matches!(
            to_completed.validate(OrderStatus::New),
            Err(DomainError::InvalidStatusTransition { .. })
        ));

        let comment_only = OrderUpdateRequest {
            comment: Some("call before".into()),
            ..Default::default()
        };
        assert!(comment_only.validate(OrderStatus::Cancelled).is_ok());
    }

    #[test]
    fn product_request_validation() {
        let mut req = ProductCreateRequest {
            name: "  Widget ".into(),
            product_code: Uuid::new_v4(),
            customer_cost: Money::from_minor(999),
            initial_stock: None,
        };
        assert!(req.validate().is_ok());
        assert_eq!(req.clone().into_new_product().name, "Widget");

        req.customer_cost = Money::zero();
        assert!(req.validate().is_err());

        req.customer_cost = "7.005".parse().unwrap();
        assert!(matches!(req.validate(), Err(DomainError::InvalidProduct(_))));

        req.customer_cost = "7.500".parse().unwrap();
        assert!(req.validate().is_ok());

        req.customer_cost = Money::from_minor(1);
        req.name = "W".into();
        assert!(req.validate().is_err());
    }
}
