//! Shared types for the order-management backend.

mod money;
mod records;
mod status;
mod types;

pub use money::Money;
pub use records::{Customer, LineItem, OrderRecord, Product};
pub use status::{OrderStatus, UnknownStatus};
pub use types::{CustomerId, LineItemId, OrderId, ProductId};
