//! Core rules of the commerce engine.
//!
//! - [`InventoryLedger`]: reserve, release, confirm and adjust stock, always
//!   through guarded writes
//! - [`OrderStateMachine`]: the order status table and the stock effect of
//!   each transition
//! - [`PricingPolicy`]: tax and shipping for one store's order
//!
//! Every multi-record change runs inside a transaction supplied by the
//! [`store::TransactionCoordinator`].

pub mod error;
pub mod inventory;
pub mod order;
pub mod pricing;

pub use error::{DomainError, GENERIC_RETRY_MESSAGE, LedgerError, OrderError, Result};
pub use inventory::{Availability, AvailabilityRequest, InventoryLedger, primitives};
pub use order::{OrderStateMachine, RestockPolicy, generate_order_number};
pub use pricing::PricingPolicy;
