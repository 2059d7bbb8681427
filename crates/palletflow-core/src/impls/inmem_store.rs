//! In-memory LogisticsStore (development and tests).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::product::normalize_name;
use crate::domain::{
    InventoryOp, Location, LocationId, LocationKind, LogisticsError, LogisticsResult, Product,
    ProductId, Task, TaskId, Withdrawal, plan_withdrawal,
};
use crate::ports::{LogisticsStore, TaskMutator};

/// In-memory store state.
#[derive(Default)]
struct InMemoryState {
    products: HashMap<ProductId, Product>,

    locations: HashMap<LocationId, Location>,

    tasks: HashMap<TaskId, Task>,

    /// Last issued production number (0 = none issued yet).
    last_production_number: u64,
}

impl InMemoryState {
    fn name_taken(&self, name: &str, except: Option<ProductId>) -> bool {
        let key = normalize_name(name);
        self.products
            .values()
            .any(|p| Some(p.id) != except && p.normalized_name() == key)
    }

    fn location_mut(&mut self, id: LocationId) -> LogisticsResult<&mut Location> {
        self.locations
            .get_mut(&id)
            .ok_or_else(|| LogisticsError::invalid_reference("location", id))
    }
}

/// InMemoryStore は開発・テスト用の正本
///
/// # 実装詳細
/// - 全レコードを 1 つの `tokio::sync::Mutex` の下に置く
/// - ロックを取っている間に検証と書き込みを両方行うので、
///   容量チェックと inventory 更新の間に他の書き込みは入らない
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LogisticsStore for InMemoryStore {
    async fn insert_product(&self, product: Product) -> LogisticsResult<()> {
        let mut state = self.state.lock().await;
        if state.name_taken(&product.name, None) {
            return Err(LogisticsError::InvalidInput(format!(
                "a product named {} already exists",
                product.name
            )));
        }
        state.products.insert(product.id, product);
        Ok(())
    }

    async fn update_product(&self, product: Product) -> LogisticsResult<()> {
        let mut state = self.state.lock().await;
        if !state.products.contains_key(&product.id) {
            return Err(LogisticsError::invalid_reference("product", product.id));
        }
        if state.name_taken(&product.name, Some(product.id)) {
            return Err(LogisticsError::InvalidInput(format!(
                "a product named {} already exists",
                product.name
            )));
        }
        state.products.insert(product.id, product);
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> LogisticsResult<Option<Product>> {
        Ok(self.state.lock().await.products.get(&id).cloned())
    }

    async fn list_products(&self) -> LogisticsResult<Vec<Product>> {
        let state = self.state.lock().await;
        let mut products: Vec<_> = state.products.values().cloned().collect();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(products)
    }

    async fn remove_product(&self, id: ProductId) -> LogisticsResult<Option<Product>> {
        let mut state = self.state.lock().await;
        if let Some(holder) = state
            .locations
            .values()
            .find(|l| l.inventory.product(&id).is_some())
        {
            return Err(LogisticsError::InvalidInput(format!(
                "{id} still has inventory at {}",
                holder.name
            )));
        }
        Ok(state.products.remove(&id))
    }

    async fn increment_product_stock(&self, id: ProductId, by: u64) -> LogisticsResult<u64> {
        let mut state = self.state.lock().await;
        let product = state
            .products
            .get_mut(&id)
            .ok_or_else(|| LogisticsError::invalid_reference("product", id))?;
        product.stock = product.stock.saturating_add(by);
        Ok(product.stock)
    }

    async fn insert_location(&self, location: Location) -> LogisticsResult<()> {
        let mut state = self.state.lock().await;
        if state
            .locations
            .values()
            .any(|l| l.qr_code == location.qr_code)
        {
            return Err(LogisticsError::InvalidInput(format!(
                "location code {} is already in use",
                location.qr_code
            )));
        }
        state.locations.insert(location.id, location);
        Ok(())
    }

    async fn get_location(&self, id: LocationId) -> LogisticsResult<Option<Location>> {
        Ok(self.state.lock().await.locations.get(&id).cloned())
    }

    async fn list_locations(&self) -> LogisticsResult<Vec<Location>> {
        let state = self.state.lock().await;
        let mut locations: Vec<_> = state.locations.values().cloned().collect();
        locations.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.name.cmp(&b.name)));
        Ok(locations)
    }

    async fn set_capacity(
        &self,
        id: LocationId,
        capacity: Option<u32>,
    ) -> LogisticsResult<Location> {
        let mut state = self.state.lock().await;
        let location = state.location_mut(id)?;
        let capacity = capacity.filter(|c| *c > 0);
        if location.kind.requires_capacity() && capacity.is_none() {
            return Err(LogisticsError::InvalidInput(format!(
                "a {} needs a positive capacity",
                location.kind
            )));
        }
        if let Some(cap) = capacity {
            if cap < location.load() {
                return Err(LogisticsError::InvalidInput(format!(
                    "capacity {cap} is below the current load of {} ({} pallets)",
                    location.name,
                    location.load()
                )));
            }
        }
        location.capacity = capacity;
        Ok(location.clone())
    }

    async fn remove_location(&self, id: LocationId) -> LogisticsResult<Option<Location>> {
        let mut state = self.state.lock().await;
        match state.locations.get(&id) {
            Some(location) if !location.inventory.is_empty() => {
                Err(LogisticsError::InvalidInput(format!(
                    "{} still holds {} pallets",
                    location.name,
                    location.load()
                )))
            }
            _ => Ok(state.locations.remove(&id)),
        }
    }

    async fn apply_inventory(
        &self,
        id: LocationId,
        ops: Vec<InventoryOp>,
    ) -> LogisticsResult<Vec<i64>> {
        let mut state = self.state.lock().await;
        state.location_mut(id)?.apply_ops(&ops)
    }

    async fn withdraw_fefo(
        &self,
        product_id: ProductId,
        product_label: &str,
        quantity: u32,
        restrict_to: Option<LocationId>,
    ) -> LogisticsResult<Vec<Withdrawal>> {
        let mut state = self.state.lock().await;
        let candidates = state
            .locations
            .values()
            .filter(|l| restrict_to.is_none_or(|only| l.id == only));
        let plan = plan_withdrawal(candidates, &product_id, product_label, quantity)?;

        // 計画はロック内で立てたので、ここでの適用は失敗しない
        let mut by_location: HashMap<LocationId, Vec<InventoryOp>> = HashMap::new();
        for w in &plan {
            by_location
                .entry(w.location.id)
                .or_default()
                .push(w.to_op(product_id));
        }
        for (location_id, ops) in by_location {
            let location = state.location_mut(location_id)?;
            debug_assert_eq!(location.kind, LocationKind::Warehouse);
            location.apply_ops(&ops)?;
        }
        Ok(plan)
    }

    async fn next_production_number(&self) -> LogisticsResult<u64> {
        let mut state = self.state.lock().await;
        state.last_production_number += 1;
        Ok(state.last_production_number)
    }

    async fn claim_production_number(&self, number: u64) -> LogisticsResult<u64> {
        let mut state = self.state.lock().await;
        if number <= state.last_production_number {
            return Err(LogisticsError::InvalidInput(format!(
                "production number {number} is not above the last issued {}",
                state.last_production_number
            )));
        }
        state.last_production_number = number;
        Ok(number)
    }

    async fn last_production_number(&self) -> LogisticsResult<u64> {
        Ok(self.state.lock().await.last_production_number)
    }

    async fn insert_task(&self, task: Task) -> LogisticsResult<()> {
        let mut state = self.state.lock().await;
        if state.tasks.contains_key(&task.id) {
            return Err(LogisticsError::InvalidInput(format!(
                "{} already exists",
                task.id
            )));
        }
        state.tasks.insert(task.id, task);
        Ok(())
    }

    async fn get_task(&self, id: TaskId) -> LogisticsResult<Option<Task>> {
        Ok(self.state.lock().await.tasks.get(&id).cloned())
    }

    async fn list_tasks(&self) -> LogisticsResult<Vec<Task>> {
        let state = self.state.lock().await;
        let mut tasks: Vec<_> = state.tasks.values().cloned().collect();
        tasks.sort_by_key(|t| (t.created_at, t.id));
        Ok(tasks)
    }

    async fn modify_task(&self, id: TaskId, mutator: TaskMutator) -> LogisticsResult<Task> {
        let mut state = self.state.lock().await;
        let current = state
            .tasks
            .get_mut(&id)
            .ok_or_else(|| LogisticsError::invalid_reference("task", id))?;
        let mut draft = current.clone();
        mutator(&mut draft)?;
        *current = draft.clone();
        Ok(draft)
    }

    async fn remove_task(&self, id: TaskId) -> LogisticsResult<Option<Task>> {
        Ok(self.state.lock().await.tasks.remove(&id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BatchKey, BatchStatus, LocationKind};
    use chrono::{TimeZone, Utc};
    use ulid::Ulid;

    fn product(name: &str) -> Product {
        Product::new(ProductId::from_ulid(Ulid::new()), name, "QR", 30).unwrap()
    }

    fn location(kind: LocationKind, code: &str, capacity: Option<u32>) -> Location {
        Location::new(LocationId::from_ulid(Ulid::new()), kind, code, code, capacity).unwrap()
    }

    fn deposit(product_id: ProductId, pn: u64, quantity: u32, day: u32) -> InventoryOp {
        InventoryOp::Deposit {
            product_id,
            production_number: pn,
            quantity,
            expiration_date: Utc.with_ymd_and_hms(2026, 4, day, 0, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn product_names_are_unique_ignoring_case_and_spaces() {
        let store = InMemoryStore::new();
        store.insert_product(product("Ayran")).await.unwrap();
        let err = store.insert_product(product("  aYRAN ")).await.unwrap_err();
        assert!(matches!(err, LogisticsError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn product_with_inventory_cannot_be_removed() {
        let store = InMemoryStore::new();
        let p = product("Süt");
        let w = location(LocationKind::Warehouse, "W1", Some(10));
        let (pid, wid) = (p.id, w.id);
        store.insert_product(p).await.unwrap();
        store.insert_location(w).await.unwrap();
        store
            .apply_inventory(wid, vec![deposit(pid, 1, 2, 1)])
            .await
            .unwrap();

        assert!(store.remove_product(pid).await.is_err());
        assert!(store.remove_location(wid).await.is_err());
    }

    #[tokio::test]
    async fn capacity_cannot_drop_below_load() {
        let store = InMemoryStore::new();
        let p = ProductId::from_ulid(Ulid::new());
        let w = location(LocationKind::Warehouse, "W1", Some(10));
        let wid = w.id;
        store.insert_location(w).await.unwrap();
        store
            .apply_inventory(wid, vec![deposit(p, 1, 6, 1)])
            .await
            .unwrap();

        assert!(store.set_capacity(wid, Some(5)).await.is_err());
        let updated = store.set_capacity(wid, Some(6)).await.unwrap();
        assert_eq!(updated.capacity, Some(6));
    }

    #[tokio::test]
    async fn duplicate_location_codes_are_rejected() {
        let store = InMemoryStore::new();
        store
            .insert_location(location(LocationKind::Truck, "T1", Some(5)))
            .await
            .unwrap();
        assert!(
            store
                .insert_location(location(LocationKind::Truck, "T1", Some(5)))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn rejected_inventory_update_leaves_location_untouched() {
        let store = InMemoryStore::new();
        let p = ProductId::from_ulid(Ulid::new());
        let t = location(LocationKind::Truck, "T1", Some(10));
        let tid = t.id;
        store.insert_location(t).await.unwrap();

        let allocate = |quantity| InventoryOp::Allocate {
            product_id: p,
            task_id: TaskId::from_ulid(Ulid::new()),
            production_number: 1,
            quantity,
            expiration_date: Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap(),
            status: BatchStatus::Reserved,
        };
        let err = store
            .apply_inventory(tid, vec![allocate(4), allocate(7)])
            .await
            .unwrap_err();
        assert!(matches!(err, LogisticsError::CapacityExceeded { .. }));
        assert_eq!(store.get_location(tid).await.unwrap().unwrap().load(), 0);
    }

    #[tokio::test]
    async fn fefo_withdrawal_is_applied_in_one_step() {
        let store = InMemoryStore::new();
        let p = ProductId::from_ulid(Ulid::new());
        let a = location(LocationKind::Warehouse, "A", Some(50));
        let b = location(LocationKind::Warehouse, "B", Some(50));
        let (aid, bid) = (a.id, b.id);
        store.insert_location(a).await.unwrap();
        store.insert_location(b).await.unwrap();
        store
            .apply_inventory(aid, vec![deposit(p, 1, 5, 10)])
            .await
            .unwrap();
        store
            .apply_inventory(bid, vec![deposit(p, 2, 5, 3)])
            .await
            .unwrap();

        let plan = store.withdraw_fefo(p, "Süt", 7, None).await.unwrap();
        assert_eq!(plan[0].location.id, bid);
        assert_eq!(plan[1].quantity, 2);

        let a = store.get_location(aid).await.unwrap().unwrap();
        let b = store.get_location(bid).await.unwrap().unwrap();
        assert!(b.inventory.is_empty());
        assert_eq!(
            a.inventory
                .product(&p)
                .and_then(|s| s.batch(&BatchKey::Production(1)))
                .map(|b| b.pallet_quantity),
            Some(3)
        );

        let restricted = store.withdraw_fefo(p, "Süt", 1, Some(bid)).await;
        assert!(matches!(
            restricted,
            Err(LogisticsError::InsufficientStock { available: 0, .. })
        ));
    }

    #[tokio::test]
    async fn production_numbers_are_monotonic() {
        let store = InMemoryStore::new();
        assert_eq!(store.next_production_number().await.unwrap(), 1);
        assert_eq!(store.claim_production_number(40).await.unwrap(), 40);
        assert_eq!(store.next_production_number().await.unwrap(), 41);
        assert!(store.claim_production_number(41).await.is_err());
        assert_eq!(store.last_production_number().await.unwrap(), 41);
    }

    #[tokio::test]
    async fn modifying_a_missing_task_is_an_invalid_reference() {
        let store = InMemoryStore::new();
        let missing = TaskId::from_ulid(Ulid::new());
        let err = store
            .modify_task(missing, Box::new(|_| Ok(())))
            .await
            .unwrap_err();
        assert!(matches!(err, LogisticsError::InvalidReference { .. }));
    }
}
