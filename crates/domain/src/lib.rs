//! Domain layer for order management.
//!
//! This crate provides:
//! - The order model and the patch type used to update it
//! - Stock reservation and release against the product catalog
//! - Status transition policies and their effect on stock
//! - `OrderService`, which runs every operation in one store transaction

pub mod error;
pub mod lifecycle;
pub mod order;
pub mod reservation;
pub mod service;

pub use error::{DomainError, OrderError};
pub use lifecycle::{StockEffect, TransitionPolicy, UnknownPolicy};
pub use order::{LineItemDetails, LineItemRequest, Order, OrderDetails, OrderPatch};
pub use reservation::{Reservation, ReservedItem};
pub use service::OrderService;
