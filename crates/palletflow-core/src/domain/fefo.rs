//! FEFO (first-expired-first-out) withdrawal planning.
//!
//! Planning is pure: it reads warehouse inventories and returns the batches
//! to consume. The store applies the plan inside the same critical section
//! it was computed in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{LogisticsError, LogisticsResult};
use super::ids::ProductId;
use super::inventory::{Batch, BatchKey};
use super::location::{InventoryOp, Location, LocationKind, LocationRef};

/// One slice of a withdrawal: `quantity` pallets taken from one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub location: LocationRef,
    pub key: BatchKey,
    pub production_number: u64,
    pub quantity: u32,
    pub expiration_date: DateTime<Utc>,
}

impl Withdrawal {
    pub fn to_op(&self, product_id: ProductId) -> InventoryOp {
        InventoryOp::Withdraw {
            product_id,
            key: self.key,
            quantity: self.quantity,
        }
    }

    /// The op that puts this slice back where it came from.
    pub fn restore_op(&self, product_id: ProductId) -> InventoryOp {
        InventoryOp::Restore {
            product_id,
            key: self.key,
            batch: Batch {
                production_number: self.production_number,
                pallet_quantity: self.quantity,
                expiration_date: self.expiration_date,
                allocation: None,
            },
        }
    }
}

/// Plans a withdrawal of `quantity` pallets of `product_id` across
/// `locations`, soonest expiration first.
///
/// - Only warehouse stock batches take part (truck allocations never do).
/// - Ties break on production number, then location id.
/// - `InsufficientStock` if the candidates hold fewer pallets than requested.
pub fn plan_withdrawal<'a>(
    locations: impl IntoIterator<Item = &'a Location>,
    product_id: &ProductId,
    product_label: &str,
    quantity: u32,
) -> LogisticsResult<Vec<Withdrawal>> {
    let mut candidates: Vec<(&Location, &BatchKey, &Batch)> = locations
        .into_iter()
        .filter(|loc| loc.kind == LocationKind::Warehouse)
        .filter_map(|loc| loc.inventory.product(product_id).map(|slot| (loc, slot)))
        .flat_map(|(loc, slot)| {
            slot.batches()
                .iter()
                .filter(|(_, b)| b.allocation.is_none())
                .map(move |(key, batch)| (loc, key, batch))
        })
        .collect();

    let available: u32 = candidates.iter().map(|(_, _, b)| b.pallet_quantity).sum();
    if available < quantity {
        return Err(LogisticsError::InsufficientStock {
            product: product_label.to_string(),
            requested: quantity,
            available,
        });
    }

    candidates.sort_by(|(la, _, a), (lb, _, b)| {
        a.expiration_date
            .cmp(&b.expiration_date)
            .then(a.production_number.cmp(&b.production_number))
            .then(la.id.cmp(&lb.id))
    });

    let mut remaining = quantity;
    let mut plan = Vec::new();
    for (loc, key, batch) in candidates {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(batch.pallet_quantity);
        plan.push(Withdrawal {
            location: loc.to_ref(),
            key: *key,
            production_number: batch.production_number,
            quantity: take,
            expiration_date: batch.expiration_date,
        });
        remaining -= take;
    }
    Ok(plan)
}
