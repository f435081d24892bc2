//! Inventory ledger: reservation, release, confirmation and seller
//! adjustments of stock.

mod ledger;
pub mod primitives;

pub use ledger::{Availability, AvailabilityRequest, InventoryLedger};
