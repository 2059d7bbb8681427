//! Locations and the inventory operations applied to them.
//!
//! `Location::apply_ops` is the single mutation entry point: a list of
//! `InventoryOp`s is checked against capacity and applied to a copy, and the
//! copy replaces the inventory only if every op succeeded. Stores run it
//! inside their per-location critical section, so the capacity check and the
//! write can never be split by a concurrent writer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::capacity::Space;
use super::errors::{LogisticsError, LogisticsResult};
use super::ids::{LocationId, ProductId, TaskId};
use super::inventory::{Allocation, Batch, BatchKey, BatchStatus, LocationInventory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LocationKind {
    Warehouse,
    Truck,
    DeliveryPoint,
    ProductionLine,
}

impl LocationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LocationKind::Warehouse => "warehouse",
            LocationKind::Truck => "truck",
            LocationKind::DeliveryPoint => "deliveryPoint",
            LocationKind::ProductionLine => "productionLine",
        }
    }

    /// Warehouses and trucks must declare a capacity.
    pub fn requires_capacity(self) -> bool {
        matches!(self, LocationKind::Warehouse | LocationKind::Truck)
    }
}

impl fmt::Display for LocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a location's identity, copied onto tasks and withdrawals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRef {
    pub id: LocationId,
    pub kind: LocationKind,
    pub name: String,
    pub qr_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub kind: LocationKind,
    pub name: String,
    pub qr_code: String,
    pub capacity: Option<u32>,
    #[serde(default)]
    pub inventory: LocationInventory,
}

/// One inventory mutation. Positive ops are capacity-checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum InventoryOp {
    /// Stock deposit into the batch keyed by production number (merging).
    Deposit {
        product_id: ProductId,
        production_number: u64,
        quantity: u32,
        expiration_date: DateTime<Utc>,
    },

    /// Stock withdrawal from a named batch, floored at zero.
    Withdraw {
        product_id: ProductId,
        key: BatchKey,
        quantity: u32,
    },

    /// Truck batch owned by a task, created in the given status.
    Allocate {
        product_id: ProductId,
        task_id: TaskId,
        production_number: u64,
        quantity: u32,
        expiration_date: DateTime<Utc>,
        status: BatchStatus,
    },

    /// Drops a task's truck batch whatever its status.
    Release {
        product_id: ProductId,
        task_id: TaskId,
    },

    /// Reserved -> Loaded for a task's truck batch.
    MarkLoaded {
        product_id: ProductId,
        task_id: TaskId,
    },

    /// Loaded -> Reserved. A missing or still-reserved batch is left alone.
    MarkReserved {
        product_id: ProductId,
        task_id: TaskId,
    },

    /// Puts pallets back into a batch with its original metadata.
    Restore {
        product_id: ProductId,
        key: BatchKey,
        batch: Batch,
    },
}

impl InventoryOp {
    pub fn product_id(&self) -> ProductId {
        match self {
            InventoryOp::Deposit { product_id, .. }
            | InventoryOp::Withdraw { product_id, .. }
            | InventoryOp::Allocate { product_id, .. }
            | InventoryOp::Release { product_id, .. }
            | InventoryOp::MarkLoaded { product_id, .. }
            | InventoryOp::MarkReserved { product_id, .. }
            | InventoryOp::Restore { product_id, .. } => *product_id,
        }
    }
}

impl Location {
    pub fn new(
        id: LocationId,
        kind: LocationKind,
        name: impl Into<String>,
        qr_code: impl Into<String>,
        capacity: Option<u32>,
    ) -> LogisticsResult<Self> {
        let name = name.into().trim().to_string();
        let qr_code = qr_code.into().trim().to_string();
        if name.is_empty() || qr_code.is_empty() {
            return Err(LogisticsError::InvalidInput(
                "location name and code must not be blank".into(),
            ));
        }
        let capacity = capacity.filter(|c| *c > 0);
        if kind.requires_capacity() && capacity.is_none() {
            return Err(LogisticsError::InvalidInput(format!(
                "a {kind} needs a positive capacity"
            )));
        }
        Ok(Self {
            id,
            kind,
            name,
            qr_code,
            capacity,
            inventory: LocationInventory::default(),
        })
    }

    pub fn load(&self) -> u32 {
        self.inventory.load()
    }

    pub fn available_space(&self) -> Space {
        Space::available(self.capacity, self.load())
    }

    pub fn to_ref(&self) -> LocationRef {
        LocationRef {
            id: self.id,
            kind: self.kind,
            name: self.name.clone(),
            qr_code: self.qr_code.clone(),
        }
    }

    /// Applies `ops` all-or-nothing. Returns the signed pallet delta of each op.
    pub fn apply_ops(&mut self, ops: &[InventoryOp]) -> LogisticsResult<Vec<i64>> {
        let mut staged = self.inventory.clone();
        let mut deltas = Vec::with_capacity(ops.len());
        for op in ops {
            deltas.push(self.apply_one(&mut staged, op)?);
        }
        debug_assert!(staged.is_consistent());
        self.inventory = staged;
        Ok(deltas)
    }

    fn space_in(&self, inv: &LocationInventory) -> Space {
        Space::available(self.capacity, inv.load())
    }

    fn flip(
        &self,
        inv: &mut LocationInventory,
        product_id: &ProductId,
        task_id: &TaskId,
        from: BatchStatus,
        to: BatchStatus,
    ) {
        let allocation = inv
            .batch_mut(product_id, &BatchKey::Task(*task_id))
            .and_then(|batch| batch.allocation.as_mut());
        match allocation {
            Some(a) if a.status == from => a.status = to,
            Some(_) => {}
            None => tracing::warn!(
                location = %self.id,
                task = %task_id,
                to = ?to,
                "no truck batch to flip"
            ),
        }
    }

    fn apply_one(&self, inv: &mut LocationInventory, op: &InventoryOp) -> LogisticsResult<i64> {
        match op {
            InventoryOp::Deposit {
                product_id,
                production_number,
                quantity,
                expiration_date,
            } => {
                self.space_in(inv).ensure(&self.name, *quantity)?;
                let template = Batch {
                    production_number: *production_number,
                    pallet_quantity: 0,
                    expiration_date: *expiration_date,
                    allocation: None,
                };
                inv.add(
                    *product_id,
                    BatchKey::Production(*production_number),
                    template,
                    *quantity,
                );
                Ok(i64::from(*quantity))
            }
            InventoryOp::Withdraw {
                product_id,
                key,
                quantity,
            } => {
                let removed = inv.remove(product_id, key, *quantity);
                if removed < *quantity {
                    tracing::warn!(
                        location = %self.id,
                        product = %product_id,
                        batch = %key,
                        requested = *quantity,
                        removed,
                        "withdrawal floored at zero"
                    );
                }
                Ok(-i64::from(removed))
            }
            InventoryOp::Allocate {
                product_id,
                task_id,
                production_number,
                quantity,
                expiration_date,
                status,
            } => {
                let key = BatchKey::Task(*task_id);
                if inv.product(product_id).and_then(|p| p.batch(&key)).is_some() {
                    return Err(LogisticsError::InvalidInput(format!(
                        "{task_id} already holds a batch on {}",
                        self.name
                    )));
                }
                self.space_in(inv).ensure(&self.name, *quantity)?;
                let template = Batch {
                    production_number: *production_number,
                    pallet_quantity: 0,
                    expiration_date: *expiration_date,
                    allocation: Some(Allocation {
                        task_id: *task_id,
                        status: *status,
                    }),
                };
                inv.add(*product_id, key, template, *quantity);
                Ok(i64::from(*quantity))
            }
            InventoryOp::Release {
                product_id,
                task_id,
            } => {
                let removed = inv.remove_batch(product_id, &BatchKey::Task(*task_id));
                Ok(-i64::from(removed))
            }
            InventoryOp::MarkLoaded {
                product_id,
                task_id,
            } => {
                self.flip(inv, product_id, task_id, BatchStatus::Reserved, BatchStatus::Loaded);
                Ok(0)
            }
            InventoryOp::MarkReserved {
                product_id,
                task_id,
            } => {
                self.flip(inv, product_id, task_id, BatchStatus::Loaded, BatchStatus::Reserved);
                Ok(0)
            }
            InventoryOp::Restore {
                product_id,
                key,
                batch,
            } => {
                self.space_in(inv).ensure(&self.name, batch.pallet_quantity)?;
                inv.add(*product_id, *key, batch.clone(), batch.pallet_quantity);
                Ok(i64::from(batch.pallet_quantity))
            }
        }
    }
}
