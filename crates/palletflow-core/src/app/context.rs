//! Shared wiring and the inventory-effect helpers used by the orchestrator
//! and the scan verifier.
//!
//! # Standing effect
//! A task holds at most one batch at its destination:
//! - truck destination: the task-keyed batch, reserved until completion and
//!   loaded after
//! - warehouse / delivery point: the production-number batch, only once the
//!   task is completed
//!
//! Edits and deletes are expressed as "swap the old standing effect for the
//! new one". A rollback undoes only what the failed call applied.
//!
//! # Task locks
//! transition / edit / delete / scan は `TaskLocks` でタスクごとに直列化し、
//! ロック取得後に読み直したレコードから effect を計算します。

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;

use crate::config::Settings;
use crate::domain::{
    BatchKey, BatchStatus, DomainEvent, ErrorKind, InventoryOp, LocationId, LogisticsError,
    LogisticsResult, Task, TaskId, TaskStatus, Withdrawal,
};
use crate::ports::{Clock, CodeGenerator, EventSink, IdGenerator, LogisticsStore};

pub(crate) struct AppContext {
    pub store: Arc<dyn LogisticsStore>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
    pub codes: Arc<dyn CodeGenerator>,
    pub events: Arc<dyn EventSink>,
    pub settings: Settings,
    pub task_locks: TaskLocks,
}

/// One async mutex per task id, created on demand.
#[derive(Default)]
pub(crate) struct TaskLocks {
    locks: Mutex<HashMap<TaskId, Arc<tokio::sync::Mutex<()>>>>,
}

impl TaskLocks {
    pub async fn lock(&self, id: TaskId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // 誰も保持・待機していないエントリを掃除
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks.entry(id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// What a task currently holds at one location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Effect {
    pub location: LocationId,
    pub apply: InventoryOp,
    pub revert: InventoryOp,
}

impl Effect {
    /// The standing effect of `task` in its current status, if any.
    pub fn standing(task: &Task) -> Option<Effect> {
        if task.is_truck_bound() {
            let status = if task.status.is_terminal() {
                BatchStatus::Loaded
            } else {
                BatchStatus::Reserved
            };
            return Some(Effect {
                location: task.to.id,
                apply: InventoryOp::Allocate {
                    product_id: task.product_id,
                    task_id: task.id,
                    production_number: task.production_number,
                    quantity: task.pallet_quantity,
                    expiration_date: task.expiration_date,
                    status,
                },
                revert: InventoryOp::Release {
                    product_id: task.product_id,
                    task_id: task.id,
                },
            });
        }
        if !task.status.is_terminal() {
            return None;
        }
        Some(Effect {
            location: task.to.id,
            apply: InventoryOp::Deposit {
                product_id: task.product_id,
                production_number: task.production_number,
                quantity: task.pallet_quantity,
                expiration_date: task.expiration_date,
            },
            revert: InventoryOp::Withdraw {
                product_id: task.product_id,
                key: BatchKey::Production(task.production_number),
                quantity: task.pallet_quantity,
            },
        })
    }
}

impl AppContext {
    /// Runs one conditional inventory update and reports the non-zero deltas.
    pub async fn apply(&self, location: LocationId, ops: Vec<InventoryOp>) -> LogisticsResult<()> {
        let products: Vec<_> = ops.iter().map(InventoryOp::product_id).collect();
        let deltas = self.store.apply_inventory(location, ops).await?;
        for (product_id, delta) in products.into_iter().zip(deltas) {
            if delta != 0 {
                self.events.emit(DomainEvent::InventoryChanged {
                    location_id: location,
                    product_id,
                    delta,
                });
            }
        }
        Ok(())
    }

    /// Replaces `old` with `new`.
    ///
    /// - same location: one atomic update, so the old contribution counts
    ///   as freed space
    /// - different locations: the new effect goes first (it is the one that
    ///   can hit capacity), then the old one is reverted; if that fails the
    ///   new effect is rolled back
    pub async fn swap_effects(&self, old: Option<&Effect>, new: Option<&Effect>) -> LogisticsResult<()> {
        match (old, new) {
            (None, None) => Ok(()),
            (Some(o), Some(n)) if o == n => Ok(()),
            (Some(o), Some(n)) if o.location == n.location => {
                self.apply(o.location, vec![o.revert.clone(), n.apply.clone()])
                    .await
            }
            (old, new) => {
                if let Some(n) = new {
                    self.apply(n.location, vec![n.apply.clone()]).await?;
                }
                if let Some(o) = old {
                    if let Err(err) = self.apply(o.location, vec![o.revert.clone()]).await {
                        if let Some(n) = new {
                            self.compensate(n.location, vec![n.revert.clone()]).await;
                        }
                        return Err(err);
                    }
                }
                Ok(())
            }
        }
    }

    /// Best-effort rollback. Failures are logged, never returned.
    pub async fn compensate(&self, location: LocationId, ops: Vec<InventoryOp>) {
        if let Err(err) = self.apply(location, ops.clone()).await {
            tracing::error!(
                location = %location,
                ops = ?ops,
                error = %err,
                "compensation failed; inventory needs manual correction"
            );
        }
    }

    /// Undoes `applied` after the task record refused the change that went
    /// with it. A task that is gone or being deleted gets nothing back; its
    /// delete reverts whatever the record still describes.
    pub async fn roll_back(
        &self,
        task_id: TaskId,
        applied: Option<&Effect>,
        previous: Option<&Effect>,
        cause: &LogisticsError,
    ) {
        let target = match cause {
            LogisticsError::InvalidReference { .. } => None,
            _ => previous,
        };
        if let Err(err) = self.swap_effects(applied, target).await {
            tracing::error!(
                task = %task_id,
                error = %err,
                "rollback failed; inventory needs manual correction"
            );
        }
    }

    /// Puts FEFO-withdrawn pallets back where they came from.
    pub async fn restore_withdrawals(&self, task: &Task, withdrawals: &[Withdrawal]) -> LogisticsResult<()> {
        let mut by_location: BTreeMap<LocationId, Vec<InventoryOp>> = BTreeMap::new();
        for w in withdrawals {
            by_location
                .entry(w.location.id)
                .or_default()
                .push(w.restore_op(task.product_id));
        }
        let mut first_error = None;
        for (location, ops) in by_location {
            if let Err(err) = self.apply(location, ops).await {
                tracing::error!(
                    task = %task.id,
                    location = %location,
                    error = %err,
                    "could not restore withdrawn pallets"
                );
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Applies the completion effect, then flips the task to completed via
    /// `finish`, which runs inside the task's read-modify-write.
    ///
    /// The record must still match `task` (status, destination, quantity);
    /// otherwise the completion effect is undone and the error returned.
    pub async fn complete(
        &self,
        task: &Task,
        finish: impl FnOnce(&mut Task) -> LogisticsResult<()> + Send + 'static,
    ) -> LogisticsResult<Task> {
        let before = Effect::standing(task);
        let mut done = task.clone();
        done.status = TaskStatus::Completed;
        let after = Effect::standing(&done);

        if task.is_truck_bound() {
            self.apply(
                task.to.id,
                vec![InventoryOp::MarkLoaded {
                    product_id: task.product_id,
                    task_id: task.id,
                }],
            )
            .await?;
        } else {
            self.swap_effects(before.as_ref(), after.as_ref()).await?;
        }

        let now = self.clock.now();
        let expected = (task.status, task.to.id, task.pallet_quantity);
        let result = self
            .store
            .modify_task(
                task.id,
                Box::new(move |t| {
                    t.ensure_live()?;
                    if (t.status, t.to.id, t.pallet_quantity) != expected {
                        return Err(LogisticsError::InvalidInput(format!(
                            "{} changed while being completed",
                            t.id
                        )));
                    }
                    finish(t)?;
                    t.advance(TaskStatus::Completed, now)
                }),
            )
            .await;

        match result {
            Ok(completed) => {
                self.events.emit(DomainEvent::TaskStatusChanged {
                    task_id: completed.id,
                    from: task.status,
                    to: TaskStatus::Completed,
                });
                tracing::info!(
                    task = %completed.id,
                    to = %completed.to.name,
                    pallets = completed.pallet_quantity,
                    "task completed"
                );
                Ok(completed)
            }
            Err(err) => {
                tracing::warn!(task = %task.id, error = %err, "completion refused, rolling back");
                if task.is_truck_bound() {
                    self.compensate(
                        task.to.id,
                        vec![InventoryOp::MarkReserved {
                            product_id: task.product_id,
                            task_id: task.id,
                        }],
                    )
                    .await;
                } else {
                    self.roll_back(task.id, after.as_ref(), before.as_ref(), &err)
                        .await;
                }
                Err(err)
            }
        }
    }
}

/// Terminal errors log at warn, infrastructure errors at error.
pub(crate) fn log_rejection(action: &'static str, err: &LogisticsError) {
    match err.kind() {
        ErrorKind::Terminal => tracing::warn!(error = %err, "{action} rejected"),
        ErrorKind::Infrastructure => tracing::error!(error = %err, "{action} failed"),
    }
}

pub(crate) fn require<T>(value: Option<T>, kind: &'static str, id: impl ToString) -> LogisticsResult<T> {
    value.ok_or_else(|| LogisticsError::invalid_reference(kind, id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{Catalog, CreateTask, Orchestrator, ProductionNumberRequest, TaskEdit};
    use crate::domain::{
        DriverId, Location, LocationKind, LocationRef, PalletSet, ProductId, TaskType,
    };
    use crate::impls::{InMemoryStore, MemoryEventSink};
    use crate::ports::{DefaultCodeGenerator, FixedClock, UlidGenerator};
    use chrono::{TimeZone, Utc};
    use ulid::Ulid;

    fn task(kind: LocationKind, status: TaskStatus) -> Task {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let loc = |kind| LocationRef {
            id: LocationId::from_ulid(Ulid::new()),
            kind,
            name: "x".into(),
            qr_code: "x".into(),
        };
        Task {
            id: TaskId::from_ulid(Ulid::new()),
            product_id: ProductId::from_ulid(Ulid::new()),
            product_name: "Süt".into(),
            product_qr_code: "SUT".into(),
            production_number: 42,
            pallet_quantity: 8,
            assigned_to: DriverId::new("d1"),
            from: loc(LocationKind::ProductionLine),
            to: loc(kind),
            task_type: TaskType::ProductionToWarehouse,
            status,
            created_at: now,
            updated_at: now,
            expiration_date: now,
            pallets: PalletSet::from_codes(Vec::<String>::new()),
            source_batches: Vec::new(),
            deleting: false,
        }
    }

    #[test]
    fn warehouse_task_holds_nothing_until_completed() {
        assert!(Effect::standing(&task(LocationKind::Warehouse, TaskStatus::InProgress)).is_none());
        let done = Effect::standing(&task(LocationKind::Warehouse, TaskStatus::Completed)).unwrap();
        assert!(matches!(
            done.revert,
            InventoryOp::Withdraw {
                key: BatchKey::Production(42),
                quantity: 8,
                ..
            }
        ));
    }

    #[test]
    fn truck_task_always_holds_its_batch() {
        let pending = Effect::standing(&task(LocationKind::Truck, TaskStatus::PendingPickup)).unwrap();
        assert!(matches!(
            pending.apply,
            InventoryOp::Allocate {
                status: BatchStatus::Reserved,
                ..
            }
        ));
        let done = Effect::standing(&task(LocationKind::Truck, TaskStatus::Completed)).unwrap();
        assert!(matches!(
            done.apply,
            InventoryOp::Allocate {
                status: BatchStatus::Loaded,
                ..
            }
        ));
    }

    struct Harness {
        ctx: Arc<AppContext>,
        catalog: Catalog,
        orchestrator: Orchestrator,
        product: ProductId,
        line: Location,
    }

    async fn harness() -> Harness {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap(),
        ));
        let ctx = Arc::new(AppContext {
            store: Arc::new(InMemoryStore::new()),
            clock: clock.clone(),
            ids: Arc::new(UlidGenerator::new(clock)),
            codes: Arc::new(DefaultCodeGenerator),
            events: Arc::new(MemoryEventSink::new()),
            settings: Settings::default(),
            task_locks: TaskLocks::default(),
        });
        let catalog = Catalog::new(ctx.clone());
        let product = catalog.create_product("Süt", Some(10)).await.unwrap().id;
        let line = catalog
            .create_location(LocationKind::ProductionLine, "Hat 1", "PL-1", None)
            .await
            .unwrap();
        Harness {
            orchestrator: Orchestrator::new(ctx.clone()),
            ctx,
            catalog,
            product,
            line,
        }
    }

    impl Harness {
        async fn location(&self, kind: LocationKind, name: &str, capacity: u32) -> Location {
            self.catalog
                .create_location(kind, name, name, Some(capacity))
                .await
                .unwrap()
        }

        async fn started(&self, task_type: TaskType, to: &Location, quantity: u32) -> Task {
            let task = self
                .orchestrator
                .create_task(CreateTask {
                    product_id: self.product,
                    task_type,
                    from_id: Some(self.line.id),
                    to_id: to.id,
                    assigned_to: DriverId::new("d1"),
                    pallet_quantity: quantity,
                    production_number: ProductionNumberRequest::Auto,
                })
                .await
                .unwrap();
            self.orchestrator
                .transition(task.id, TaskStatus::InProgress)
                .await
                .unwrap()
        }

        async fn load(&self, location: &Location) -> u32 {
            self.ctx
                .store
                .get_location(location.id)
                .await
                .unwrap()
                .unwrap()
                .load()
        }
    }

    fn deliver_all(t: &mut Task) -> LogisticsResult<()> {
        t.pallets.deliver_all();
        Ok(())
    }

    #[tokio::test]
    async fn completing_a_deleted_truck_task_reserves_nothing() {
        let h = harness().await;
        let truck = h.location(LocationKind::Truck, "TR-1", 10).await;
        let snapshot = h.started(TaskType::ProductionToTruck, &truck, 4).await;
        assert!(h.orchestrator.delete_task(snapshot.id).await.unwrap());

        let err = h.ctx.complete(&snapshot, deliver_all).await.unwrap_err();
        assert!(matches!(err, LogisticsError::InvalidReference { .. }), "{err}");
        assert_eq!(h.load(&truck).await, 0);
    }

    #[tokio::test]
    async fn completing_an_outdated_copy_undoes_its_deposit() {
        let h = harness().await;
        let first = h.location(LocationKind::Warehouse, "WH-1", 100).await;
        let second = h.location(LocationKind::Warehouse, "WH-2", 100).await;
        let snapshot = h.started(TaskType::ProductionToWarehouse, &first, 10).await;
        h.orchestrator
            .edit_task(
                snapshot.id,
                TaskEdit {
                    to_id: Some(second.id),
                    pallet_quantity: Some(5),
                    ..TaskEdit::default()
                },
            )
            .await
            .unwrap();

        let err = h.ctx.complete(&snapshot, deliver_all).await.unwrap_err();
        assert!(matches!(err, LogisticsError::InvalidInput(_)), "{err}");
        assert_eq!(h.load(&first).await, 0);
        assert_eq!(h.load(&second).await, 0);

        let current = h.orchestrator.get_task(snapshot.id).await.unwrap();
        assert_eq!(current.status, TaskStatus::InProgress);
        let done = h.ctx.complete(&current, deliver_all).await.unwrap();
        assert_eq!(done.to.id, second.id);
        assert_eq!(h.load(&second).await, 5);

        assert!(h.orchestrator.delete_task(done.id).await.unwrap());
        assert_eq!(h.load(&first).await, 0);
        assert_eq!(h.load(&second).await, 0);
    }

    #[tokio::test]
    async fn a_loaded_batch_goes_back_to_reserved_when_completion_is_refused() {
        let h = harness().await;
        let truck = h.location(LocationKind::Truck, "TR-1", 10).await;
        let snapshot = h.started(TaskType::ProductionToTruck, &truck, 4).await;

        let err = h
            .ctx
            .complete(&snapshot, |_| {
                Err(LogisticsError::verification_failed("pallets still on the line"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LogisticsError::VerificationFailed { .. }));

        let location = h.ctx.store.get_location(truck.id).await.unwrap().unwrap();
        let batch = location
            .inventory
            .product(&h.product)
            .and_then(|slot| slot.batch(&BatchKey::Task(snapshot.id)))
            .unwrap();
        assert_eq!(batch.allocation.unwrap().status, BatchStatus::Reserved);
        assert_eq!(location.load(), 4);
    }

    #[tokio::test]
    async fn rolling_back_for_a_deleted_task_restores_nothing() {
        let h = harness().await;
        let first = h.location(LocationKind::Truck, "TR-1", 10).await;
        let second = h.location(LocationKind::Truck, "TR-2", 10).await;
        let snapshot = h.started(TaskType::ProductionToTruck, &first, 4).await;
        assert!(h.orchestrator.delete_task(snapshot.id).await.unwrap());

        // 削除と競合した編集: 新しい予約だけが残っている状態
        let mut edited = snapshot.clone();
        edited.to = second.to_ref();
        edited.pallet_quantity = 6;
        let previous = Effect::standing(&snapshot);
        let applied = Effect::standing(&edited);
        h.ctx
            .swap_effects(previous.as_ref(), applied.as_ref())
            .await
            .unwrap();
        assert_eq!(h.load(&second).await, 6);

        let cause = LogisticsError::invalid_reference("task", snapshot.id);
        h.ctx
            .roll_back(snapshot.id, applied.as_ref(), previous.as_ref(), &cause)
            .await;
        assert_eq!(h.load(&first).await, 0);
        assert_eq!(h.load(&second).await, 0);
    }

    #[tokio::test]
    async fn task_locks_only_block_the_same_task() {
        use std::time::Duration;
        use tokio::time::timeout;

        let locks = TaskLocks::default();
        let a = TaskId::from_ulid(Ulid::new());
        let b = TaskId::from_ulid(Ulid::new());

        let held = locks.lock(a).await;
        assert!(timeout(Duration::from_millis(20), locks.lock(b)).await.is_ok());
        assert!(timeout(Duration::from_millis(20), locks.lock(a)).await.is_err());
        drop(held);
        assert!(timeout(Duration::from_millis(20), locks.lock(a)).await.is_ok());
    }
}
