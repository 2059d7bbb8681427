//! Reports - 読み取り専用のスナップショット
//!
//! 帳票や Excel の整形は外部のレンダラーの仕事で、ここでは数字だけを返します。
//! すべて serde で JSON にできる形です。

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::context::{AppContext, require};
use crate::domain::{
    BatchKey, BatchStatus, DriverId, LocationId, LocationKind, LogisticsResult, ProductId, Task,
    TaskId, TaskStatus,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductLoad {
    pub product_id: ProductId,
    pub product_name: String,
    pub pallets: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationStats {
    pub location_id: LocationId,
    pub name: String,
    pub kind: LocationKind,
    pub capacity: Option<u32>,
    pub total_pallets: u32,
    /// Truck pallets reserved for tasks not yet completed.
    pub reserved_pallets: u32,
    /// Truck pallets of completed tasks.
    pub loaded_pallets: u32,
    /// `None` when the location has no capacity limit.
    pub available: Option<u32>,
    /// Rounded to the nearest percent; 0 without a capacity.
    pub usage_percent: u32,
    pub products: Vec<ProductLoad>,
    pub reserved_task_ids: Vec<TaskId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WarehouseShare {
    pub location_id: LocationId,
    pub name: String,
    pub pallets: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductDistribution {
    pub product_id: ProductId,
    pub product_name: String,
    pub warehouses: Vec<WarehouseShare>,
    pub warehouse_total: u32,
    /// Coarse delivered counter kept on the product record.
    pub stock_counter: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DriverCounts {
    pub total: usize,
    pub completed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskSummary {
    pub total: usize,
    pub pending_pickup: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub total_pallets: u64,
    /// Completed / total, in percent (0 when there are no tasks).
    pub completion_rate: u32,
    pub by_driver: BTreeMap<DriverId, DriverCounts>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpiringBatch {
    pub location_id: LocationId,
    pub location_name: String,
    pub product_id: ProductId,
    pub production_number: u64,
    pub pallets: u32,
    pub expiration_date: DateTime<Utc>,
}

#[derive(Clone)]
pub struct Reports {
    ctx: Arc<AppContext>,
}

impl Reports {
    pub(crate) fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    pub async fn location_stats(&self, id: LocationId) -> LogisticsResult<LocationStats> {
        let location = require(self.ctx.store.get_location(id).await?, "location", id)?;
        let names = self.product_names().await?;

        let mut reserved = 0;
        let mut loaded = 0;
        let mut reserved_task_ids = Vec::new();
        let mut products = Vec::new();
        for (product_id, slot) in location.inventory.products() {
            for batch in slot.batches().values() {
                match batch.allocation {
                    Some(a) if a.status == BatchStatus::Reserved => {
                        reserved += batch.pallet_quantity;
                        reserved_task_ids.push(a.task_id);
                    }
                    Some(_) => loaded += batch.pallet_quantity,
                    None => {}
                }
            }
            products.push(ProductLoad {
                product_id: *product_id,
                product_name: names.get(product_id).cloned().unwrap_or_default(),
                pallets: slot.total_pallets(),
            });
        }
        products.sort_by(|a, b| b.pallets.cmp(&a.pallets));

        let total = location.load();
        let usage_percent = match location.capacity {
            Some(cap) if cap > 0 => ((f64::from(total) / f64::from(cap)) * 100.0).round() as u32,
            _ => 0,
        };
        Ok(LocationStats {
            location_id: location.id,
            name: location.name.clone(),
            kind: location.kind,
            capacity: location.capacity,
            total_pallets: total,
            reserved_pallets: reserved,
            loaded_pallets: loaded,
            available: location.available_space().as_pallets(),
            usage_percent,
            products,
            reserved_task_ids,
        })
    }

    pub async fn product_distribution(&self, id: ProductId) -> LogisticsResult<ProductDistribution> {
        let product = require(self.ctx.store.get_product(id).await?, "product", id)?;
        let warehouses: Vec<_> = self
            .ctx
            .store
            .list_locations()
            .await?
            .into_iter()
            .filter(|l| l.kind == LocationKind::Warehouse)
            .filter_map(|l| {
                let pallets = l.inventory.product(&id)?.total_pallets();
                Some(WarehouseShare {
                    location_id: l.id,
                    name: l.name,
                    pallets,
                })
            })
            .collect();
        Ok(ProductDistribution {
            product_id: product.id,
            product_name: product.name,
            warehouse_total: warehouses.iter().map(|w| w.pallets).sum(),
            warehouses,
            stock_counter: product.stock,
        })
    }

    pub async fn task_summary(&self) -> LogisticsResult<TaskSummary> {
        let tasks = self.ctx.store.list_tasks().await?;
        let mut summary = TaskSummary::default();
        for task in tasks.iter().filter(|t| !t.deleting) {
            summary.total += 1;
            summary.total_pallets += u64::from(task.pallet_quantity);
            match task.status {
                TaskStatus::PendingPickup => summary.pending_pickup += 1,
                TaskStatus::InProgress => summary.in_progress += 1,
                TaskStatus::Completed => summary.completed += 1,
            }
            let driver = summary
                .by_driver
                .entry(task.assigned_to.clone())
                .or_default();
            driver.total += 1;
            if task.status == TaskStatus::Completed {
                driver.completed += 1;
            }
        }
        if summary.total > 0 {
            summary.completion_rate =
                ((summary.completed as f64 / summary.total as f64) * 100.0).round() as u32;
        }
        Ok(summary)
    }

    /// A driver's tasks: pending first, then in progress, then completed;
    /// oldest first within each group.
    pub async fn driver_tasks(&self, driver: &DriverId) -> LogisticsResult<Vec<Task>> {
        let mut tasks: Vec<_> = self
            .ctx
            .store
            .list_tasks()
            .await?
            .into_iter()
            .filter(|t| !t.deleting && t.assigned_to == *driver)
            .collect();
        tasks.sort_by_key(|t| (t.status, t.created_at));
        Ok(tasks)
    }

    /// Warehouse stock expiring within `within_days` of now, soonest first.
    pub async fn expiring_batches(&self, within_days: u32) -> LogisticsResult<Vec<ExpiringBatch>> {
        let horizon = self.ctx.clock.now() + Duration::days(i64::from(within_days));
        let mut batches = Vec::new();
        for location in self.ctx.store.list_locations().await? {
            if location.kind != LocationKind::Warehouse {
                continue;
            }
            for (product_id, slot) in location.inventory.products() {
                for (key, batch) in slot.batches() {
                    if !matches!(key, BatchKey::Production(_)) || batch.expiration_date > horizon {
                        continue;
                    }
                    batches.push(ExpiringBatch {
                        location_id: location.id,
                        location_name: location.name.clone(),
                        product_id: *product_id,
                        production_number: batch.production_number,
                        pallets: batch.pallet_quantity,
                        expiration_date: batch.expiration_date,
                    });
                }
            }
        }
        batches.sort_by_key(|b| (b.expiration_date, b.production_number));
        Ok(batches)
    }

    async fn product_names(&self) -> LogisticsResult<BTreeMap<ProductId, String>> {
        Ok(self
            .ctx
            .store
            .list_products()
            .await?
            .into_iter()
            .map(|p| (p.id, p.name))
            .collect())
    }
}
