//! Durable store for the order-management backend.
//!
//! Every read and write goes through a [`StoreTransaction`], the explicit
//! transaction scope handed out by [`Store::begin`]. Two implementations
//! are provided: [`InMemoryStore`] for tests and [`PostgresStore`].

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryStore, InMemoryTransaction};
pub use postgres::{PostgresStore, PostgresTransaction};
pub use store::{Store, StoreTransaction};
