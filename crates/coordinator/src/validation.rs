//! Catalog checks shared by the plain and saga create paths.

use common::Money;
use domain::OrderCreateRequest;
use order_store::{ProductCatalog, line_total, reconcile_order_cost};

use crate::error::Result;

/// A request that passed shape and catalog checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedOrder {
    /// Σ catalog price × amount.
    pub total: Money,
}

/// Checks the request, confirms every product exists and computes the total.
///
/// A supplied non-zero cost that differs from the total fails here with
/// `InvalidOrderTotal`, before anything is written or reserved.
pub async fn validate_order_products<C>(
    catalog: &C,
    request: &OrderCreateRequest,
) -> Result<ValidatedOrder>
where
    C: ProductCatalog + ?Sized,
{
    request.validate()?;

    let mut totals = Vec::with_capacity(request.products.len());
    for item in &request.products {
        let product = catalog.get_product(item.product_id).await?;
        totals.push(line_total(product.customer_cost, item.amount)?);
    }

    let total = Money::checked_sum(totals).map_err(order_store::StoreError::from)?;
    reconcile_order_cost(request.supplied_cost(), total)?;
    Ok(ValidatedOrder { total })
}
