//! Domain layer of the order service.
//!
//! This crate provides:
//! - Create, update and product requests with their validation rules
//! - The order aggregate returned to callers and the builder that assembles
//!   it from stored rows

pub mod aggregate;
pub mod error;
pub mod request;

pub use aggregate::{
    OrderAggregate, ProductDetail, build_order_aggregate, build_product_detail,
    build_product_details,
};
pub use error::{DomainError, Result};
pub use request::{
    ANONYMOUS_PRINCIPAL, MAX_COMMENT_LEN, OrderCreateRequest, OrderProductInput,
    OrderUpdateRequest, ProductCreateRequest,
};
