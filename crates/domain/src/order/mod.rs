//! Order lifecycle: the status table, its ledger side effects and the
//! append-only history.

mod number;
mod state_machine;

pub use number::generate_order_number;
pub use state_machine::{OrderStateMachine, RestockPolicy};
