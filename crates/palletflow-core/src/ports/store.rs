//! LogisticsStore port - 正本（source of truth）
//!
//! Products, locations (with their inventories), tasks and the production
//! number counter live behind this trait.
//!
//! # 設計原則
//! - レコード単位の read-modify-write は原子的（1 task / 1 location / 1 counter）
//! - inventory の変更は常に相対値（`InventoryOp`）で渡し、容量チェックと書き込みを
//!   ストア側の 1 回の条件付き更新で行う
//! - 複数レコードにまたがるトランザクションはない。呼び出し側が補償する

use async_trait::async_trait;

use crate::domain::{
    InventoryOp, Location, LocationId, LogisticsResult, Product, ProductId, Task, TaskId,
    Withdrawal,
};

/// Read-modify-write closure for one task record. The store applies it to a
/// copy and commits only if it returns `Ok`.
pub type TaskMutator = Box<dyn FnOnce(&mut Task) -> LogisticsResult<()> + Send>;

#[async_trait]
pub trait LogisticsStore: Send + Sync {
    // ---------------------------------------------------------------- products

    /// Fails with `InvalidInput` if another product has the same normalized name.
    async fn insert_product(&self, product: Product) -> LogisticsResult<()>;

    /// Overwrites name / expiry. Same uniqueness rule as insert.
    async fn update_product(&self, product: Product) -> LogisticsResult<()>;

    async fn get_product(&self, id: ProductId) -> LogisticsResult<Option<Product>>;

    async fn list_products(&self) -> LogisticsResult<Vec<Product>>;

    /// Refused with `InvalidInput` while any location inventory holds the product.
    async fn remove_product(&self, id: ProductId) -> LogisticsResult<Option<Product>>;

    /// Atomic increment of the coarse `stock` counter. Returns the new value.
    async fn increment_product_stock(&self, id: ProductId, by: u64) -> LogisticsResult<u64>;

    // --------------------------------------------------------------- locations

    /// Fails with `InvalidInput` if the QR code is already taken.
    async fn insert_location(&self, location: Location) -> LogisticsResult<()>;

    async fn get_location(&self, id: LocationId) -> LogisticsResult<Option<Location>>;

    async fn list_locations(&self) -> LogisticsResult<Vec<Location>>;

    /// Refused with `InvalidInput` when the new capacity is below the current load.
    async fn set_capacity(&self, id: LocationId, capacity: Option<u32>)
    -> LogisticsResult<Location>;

    /// Refused with `InvalidInput` while the location holds inventory.
    async fn remove_location(&self, id: LocationId) -> LogisticsResult<Option<Location>>;

    /// Conditional atomic update of one location's inventory: every op is
    /// capacity-checked and applied, or none is. Returns the per-op deltas.
    async fn apply_inventory(
        &self,
        id: LocationId,
        ops: Vec<InventoryOp>,
    ) -> LogisticsResult<Vec<i64>>;

    /// Plans and applies a FEFO withdrawal across warehouses in one step, so
    /// two concurrent withdrawals never consume the same pallets.
    async fn withdraw_fefo(
        &self,
        product_id: ProductId,
        product_label: &str,
        quantity: u32,
        restrict_to: Option<LocationId>,
    ) -> LogisticsResult<Vec<Withdrawal>>;

    // ------------------------------------------------------ production numbers

    /// Atomic increment. Returns the newly issued number.
    async fn next_production_number(&self) -> LogisticsResult<u64>;

    /// Claims `number` and moves the counter to it. `InvalidInput` unless
    /// `number` is greater than the last issued one.
    async fn claim_production_number(&self, number: u64) -> LogisticsResult<u64>;

    async fn last_production_number(&self) -> LogisticsResult<u64>;

    // ------------------------------------------------------------------- tasks

    async fn insert_task(&self, task: Task) -> LogisticsResult<()>;

    async fn get_task(&self, id: TaskId) -> LogisticsResult<Option<Task>>;

    async fn list_tasks(&self) -> LogisticsResult<Vec<Task>>;

    /// `InvalidReference` if the task does not exist. Returns the committed record.
    async fn modify_task(&self, id: TaskId, mutator: TaskMutator) -> LogisticsResult<Task>;

    async fn remove_task(&self, id: TaskId) -> LogisticsResult<Option<Task>>;
}
