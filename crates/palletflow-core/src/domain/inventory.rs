//! Location inventory: per-product batch ledger with a cached total.
//!
//! Invariants (held after every public method):
//! - `total_pallets == Σ batch.pallet_quantity`
//! - no batch with zero pallets, no product entry with zero total

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

use super::ids::{ProductId, TaskId};

/// Batch key inside one product slot.
///
/// - Stock batches (warehouse, delivery point) are keyed by production number,
///   so deposits of the same production run merge.
/// - Truck batches are keyed by the owning task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum BatchKey {
    Production(u64),
    Task(TaskId),
}

impl fmt::Display for BatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchKey::Production(n) => write!(f, "pn-{n}"),
            BatchKey::Task(id) => id.fmt(f),
        }
    }
}

impl From<BatchKey> for String {
    fn from(key: BatchKey) -> Self {
        key.to_string()
    }
}

impl FromStr for BatchKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(n) = s.strip_prefix("pn-") {
            return n
                .parse()
                .map(BatchKey::Production)
                .map_err(|e| format!("bad production number in batch key {s}: {e}"));
        }
        if let Some(ulid) = s.strip_prefix("task-") {
            return Ulid::from_string(ulid)
                .map(|u| BatchKey::Task(TaskId::from_ulid(u)))
                .map_err(|e| format!("bad task id in batch key {s}: {e}"));
        }
        Err(format!("unrecognised batch key {s}"))
    }
}

impl TryFrom<String> for BatchKey {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Truck batch status. Reserved -> Loaded, once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Reserved,
    Loaded,
}

/// Which task claimed a truck batch, and how far it got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub task_id: TaskId,
    pub status: BatchStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub production_number: u64,
    pub pallet_quantity: u32,
    pub expiration_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocation: Option<Allocation>,
}

impl Batch {
    pub fn is_reserved(&self) -> bool {
        matches!(
            self.allocation,
            Some(Allocation {
                status: BatchStatus::Reserved,
                ..
            })
        )
    }
}

/// One product's slot in one location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInventory {
    total_pallets: u32,
    batches: BTreeMap<BatchKey, Batch>,
}

impl ProductInventory {
    pub fn total_pallets(&self) -> u32 {
        self.total_pallets
    }

    pub fn batches(&self) -> &BTreeMap<BatchKey, Batch> {
        &self.batches
    }

    pub fn batch(&self, key: &BatchKey) -> Option<&Batch> {
        self.batches.get(key)
    }

    /// Adds pallets to `key`, creating the batch from `template` if absent.
    /// A merge keeps the earlier expiration date.
    fn add(&mut self, key: BatchKey, template: Batch, quantity: u32) {
        if quantity == 0 {
            return;
        }
        let batch = self.batches.entry(key).or_insert(Batch {
            pallet_quantity: 0,
            ..template.clone()
        });
        batch.pallet_quantity += quantity;
        if template.expiration_date < batch.expiration_date {
            batch.expiration_date = template.expiration_date;
        }
        self.total_pallets += quantity;
    }

    /// Removes up to `quantity` pallets from `key`. Returns how many were
    /// actually removed; a missing batch removes nothing.
    fn remove(&mut self, key: &BatchKey, quantity: u32) -> u32 {
        let Some(batch) = self.batches.get_mut(key) else {
            return 0;
        };
        let removed = quantity.min(batch.pallet_quantity);
        batch.pallet_quantity -= removed;
        if batch.pallet_quantity == 0 {
            self.batches.remove(key);
        }
        self.total_pallets = self.total_pallets.saturating_sub(removed);
        removed
    }

    fn batch_mut(&mut self, key: &BatchKey) -> Option<&mut Batch> {
        self.batches.get_mut(key)
    }

    fn is_consistent(&self) -> bool {
        let sum: u32 = self.batches.values().map(|b| b.pallet_quantity).sum();
        sum == self.total_pallets && self.batches.values().all(|b| b.pallet_quantity > 0)
    }
}

/// All product slots of one location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationInventory {
    products: BTreeMap<ProductId, ProductInventory>,
}

impl LocationInventory {
    /// Σ total_pallets across products.
    pub fn load(&self) -> u32 {
        self.products.values().map(|p| p.total_pallets).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn product(&self, product_id: &ProductId) -> Option<&ProductInventory> {
        self.products.get(product_id)
    }

    pub fn products(&self) -> impl Iterator<Item = (&ProductId, &ProductInventory)> {
        self.products.iter()
    }

    pub fn add(&mut self, product_id: ProductId, key: BatchKey, template: Batch, quantity: u32) {
        if quantity == 0 {
            return;
        }
        self.products
            .entry(product_id)
            .or_default()
            .add(key, template, quantity);
    }

    /// Floors at zero; drops the product entry when its total reaches zero.
    pub fn remove(&mut self, product_id: &ProductId, key: &BatchKey, quantity: u32) -> u32 {
        let Some(slot) = self.products.get_mut(product_id) else {
            return 0;
        };
        let removed = slot.remove(key, quantity);
        if slot.total_pallets == 0 {
            self.products.remove(product_id);
        }
        removed
    }

    /// Removes the whole batch. Returns its pallet count (0 if absent).
    pub fn remove_batch(&mut self, product_id: &ProductId, key: &BatchKey) -> u32 {
        let quantity = self
            .products
            .get(product_id)
            .and_then(|slot| slot.batch(key))
            .map_or(0, |b| b.pallet_quantity);
        self.remove(product_id, key, quantity)
    }

    pub fn batch_mut(&mut self, product_id: &ProductId, key: &BatchKey) -> Option<&mut Batch> {
        self.products.get_mut(product_id)?.batch_mut(key)
    }

    pub fn is_consistent(&self) -> bool {
        self.products
            .values()
            .all(|p| p.total_pallets > 0 && p.is_consistent())
    }
}
