//! Guarded writes against inventory counters.
//!
//! A [`StockChange`] carries both the mutation and the condition under which
//! it may be applied. Backends evaluate the condition and perform the write
//! as one atomic step, so counters are never read and then blindly written.

use chrono::Utc;
use common::InventoryRecord;

/// A conditional mutation of one inventory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockChange {
    /// `reserved += q` while `available - reserved >= q`.
    Reserve(u32),
    /// `reserved -= q` while `reserved >= q`.
    Release(u32),
    /// `available -= q, reserved -= q` while both are `>= q`.
    Confirm(u32),
    /// `available += q`, unconditionally.
    Increment(u32),
    /// `available -= q` while the result stays `>= reserved`.
    DecrementDirect(u32),
}

impl StockChange {
    pub fn quantity(&self) -> u32 {
        match *self {
            StockChange::Reserve(q)
            | StockChange::Release(q)
            | StockChange::Confirm(q)
            | StockChange::Increment(q)
            | StockChange::DecrementDirect(q) => q,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StockChange::Reserve(_) => "reserve",
            StockChange::Release(_) => "release",
            StockChange::Confirm(_) => "confirm",
            StockChange::Increment(_) => "increment",
            StockChange::DecrementDirect(_) => "decrement_direct",
        }
    }

    /// Returns the record as it would be after the change, or `None` when the
    /// guard does not hold for `record`.
    pub fn apply_to(&self, record: &InventoryRecord) -> Option<InventoryRecord> {
        let available = record.available_stock;
        let reserved = record.reserved_stock;

        let (available, reserved) = match *self {
            StockChange::Reserve(q) => {
                let free = available.checked_sub(reserved)?;
                (free >= q).then(|| (available, reserved + q))?
            }
            StockChange::Release(q) => (available, reserved.checked_sub(q)?),
            StockChange::Confirm(q) => (available.checked_sub(q)?, reserved.checked_sub(q)?),
            StockChange::Increment(q) => (available.checked_add(q)?, reserved),
            StockChange::DecrementDirect(q) => {
                let remaining = available.checked_sub(q)?;
                (remaining >= reserved).then_some((remaining, reserved))?
            }
        };

        Some(InventoryRecord {
            available_stock: available,
            reserved_stock: reserved,
            updated_at: Utc::now(),
            ..record.clone()
        })
    }
}

impl std::fmt::Display for StockChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name(), self.quantity())
    }
}

/// Outcome of a guarded write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StockUpdate {
    /// The guard held; carries the record after the write.
    Applied(InventoryRecord),
    /// The guard did not hold; carries the unchanged record.
    Rejected(InventoryRecord),
    /// No inventory record exists for the product.
    Missing,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(available: u32, reserved: u32) -> InventoryRecord {
        let mut record = InventoryRecord::new("SKU-1", "store-a", available, 0);
        record.reserved_stock = reserved;
        record
    }

    fn counters(change: StockChange, available: u32, reserved: u32) -> Option<(u32, u32)> {
        change
            .apply_to(&record(available, reserved))
            .map(|r| (r.available_stock, r.reserved_stock))
    }

    #[test]
    fn reserve_needs_free_stock() {
        assert_eq!(counters(StockChange::Reserve(3), 5, 0), Some((5, 3)));
        assert_eq!(counters(StockChange::Reserve(3), 5, 2), None);
        assert_eq!(counters(StockChange::Reserve(5), 5, 0), Some((5, 5)));
    }

    #[test]
    fn confirm_is_a_net_sale() {
        assert_eq!(counters(StockChange::Confirm(4), 10, 4), Some((6, 0)));
        assert_eq!(counters(StockChange::Confirm(5), 10, 4), None);
    }

    #[test]
    fn release_only_touches_reserved() {
        assert_eq!(counters(StockChange::Release(2), 10, 4), Some((10, 2)));
        assert_eq!(counters(StockChange::Release(5), 10, 4), None);
    }

    #[test]
    fn decrement_direct_cannot_undercut_reservations() {
        assert_eq!(counters(StockChange::DecrementDirect(3), 10, 4), Some((7, 4)));
        assert_eq!(counters(StockChange::DecrementDirect(7), 10, 4), None);
        assert_eq!(counters(StockChange::DecrementDirect(11), 10, 0), None);
    }

    #[test]
    fn increment_is_unconditional_but_checked() {
        assert_eq!(counters(StockChange::Increment(5), 0, 0), Some((5, 0)));
        assert_eq!(counters(StockChange::Increment(1), u32::MAX, 0), None);
    }

    #[test]
    fn display_names_the_change() {
        assert_eq!(StockChange::Confirm(2).to_string(), "confirm(2)");
    }
}
