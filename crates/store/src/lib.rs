//! Storage layer for the commerce engine.
//!
//! - [`Store`] / [`Transaction`]: the storage port every service writes through
//! - [`StockChange`]: guarded inventory writes whose precondition is checked
//!   atomically with the write
//! - [`TransactionCoordinator`]: all-or-nothing envelope with bounded retry on
//!   transient conflicts
//! - [`InMemoryStore`] and [`PostgresStore`]: the two backends

pub mod coordinator;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod stock;
pub mod store;

pub use coordinator::{RetryConfig, TransactionCoordinator, TxFuture};
pub use error::{Result, Retryable, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use stock::{StockChange, StockUpdate};
pub use store::{Store, Transaction};
