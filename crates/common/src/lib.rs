//! Shared types for the order service.
//!
//! Identifiers, the fixed-precision [`Money`] type, the order status
//! enumeration and the error-kind taxonomy every layer maps into.

pub mod error;
pub mod money;
pub mod status;
pub mod types;

pub use error::ErrorKind;
pub use money::{Money, MoneyOverflow};
pub use status::{OrderStatus, ParseStatusError};
pub use types::{InvalidId, OrderId, ProductId};
