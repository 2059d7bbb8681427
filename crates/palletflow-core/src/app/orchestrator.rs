//! Task Orchestrator - タスクの作成・遷移・編集・削除
//!
//! 各操作は「検証 → inventory 変更 → task レコード変更」の順で進みます。
//! ストアに複数レコードのトランザクションはないので、後段が失敗したら
//! 前段を補償（逆操作）して、呼び出し側には元のエラーを返します。

use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::context::{AppContext, Effect, log_rejection, require};
use crate::domain::{
    DomainEvent, DriverId, Location, LocationId, LocationKind, LogisticsError,
    LogisticsResult, PalletSet, PalletStatus, ProductId, Task, TaskId, TaskStatus, TaskType,
};
use crate::ports::PalletCodeRequest;

/// How a production-origin task gets its production number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductionNumberRequest {
    /// Next number from the global counter.
    #[default]
    Auto,

    /// A specific number, which must be above the last issued one.
    Explicit(u64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTask {
    pub product_id: ProductId,
    pub task_type: TaskType,
    /// Required for production-origin tasks. For `warehouseToTruck` it
    /// optionally pins the warehouse FEFO may draw from.
    pub from_id: Option<LocationId>,
    pub to_id: LocationId,
    pub assigned_to: DriverId,
    pub pallet_quantity: u32,
    #[serde(default)]
    pub production_number: ProductionNumberRequest,
}

/// Editable task fields. `None` keeps the current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskEdit {
    pub to_id: Option<LocationId>,
    pub pallet_quantity: Option<u32>,
    pub assigned_to: Option<DriverId>,
}

/// Orchestrator は Task のライフサイクルと inventory 伝播を担当
#[derive(Clone)]
pub struct Orchestrator {
    ctx: Arc<AppContext>,
}

impl Orchestrator {
    pub(crate) fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    /// The number the next `Auto` request would receive.
    pub async fn peek_next_production_number(&self) -> LogisticsResult<u64> {
        Ok(self.ctx.store.last_production_number().await? + 1)
    }

    pub async fn get_task(&self, id: TaskId) -> LogisticsResult<Task> {
        let task = require(self.ctx.store.get_task(id).await?, "task", id)?;
        task.ensure_live()?;
        Ok(task)
    }

    /// Live tasks, oldest first.
    pub async fn list_tasks(&self) -> LogisticsResult<Vec<Task>> {
        let mut tasks = self.ctx.store.list_tasks().await?;
        tasks.retain(|t| !t.deleting);
        Ok(tasks)
    }

    /// Creates a task.
    ///
    /// 1. 参照の解決と種別チェック
    /// 2. 行き先の容量チェック
    /// 3. warehouseToTruck: FEFO で倉庫から引き当て（即時に減算）
    /// 4. 生産番号の決定
    /// 5. トラック行き: 予約バッチを作成
    /// 6. Task レコードを保存
    #[tracing::instrument(
        skip(self, req),
        fields(product = %req.product_id, to = %req.to_id, task_type = %req.task_type)
    )]
    pub async fn create_task(&self, req: CreateTask) -> LogisticsResult<Task> {
        if req.pallet_quantity == 0 {
            return Err(LogisticsError::InvalidInput(
                "pallet quantity must be at least 1".into(),
            ));
        }
        let store = &self.ctx.store;
        let product = require(store.get_product(req.product_id).await?, "product", req.product_id)?;
        let to = require(store.get_location(req.to_id).await?, "location", req.to_id)?;
        if !req.task_type.accepts_destination(to.kind) {
            return Err(LogisticsError::InvalidInput(format!(
                "{} cannot deliver to a {}",
                req.task_type, to.kind
            )));
        }
        let source = self.resolve_source(&req).await?;
        if let Err(err) = to.available_space().ensure(&to.name, req.pallet_quantity) {
            log_rejection("task", &err);
            return Err(err);
        }

        let now = self.ctx.clock.now();
        let task_id = self.ctx.ids.generate_task_id();
        let expiration_date = now + Duration::days(i64::from(product.expiry_days));

        let (from, production_number, source_batches) = match source {
            Some(from) => {
                let number = match req.production_number {
                    ProductionNumberRequest::Auto => store.next_production_number().await?,
                    ProductionNumberRequest::Explicit(n) => store.claim_production_number(n).await?,
                };
                (from.to_ref(), number, Vec::new())
            }
            None => {
                let withdrawals = store
                    .withdraw_fefo(product.id, &product.name, req.pallet_quantity, req.from_id)
                    .await
                    .inspect_err(|err| log_rejection("task", err))?;
                for w in &withdrawals {
                    self.ctx.events.emit(DomainEvent::InventoryChanged {
                        location_id: w.location.id,
                        product_id: product.id,
                        delta: -i64::from(w.quantity),
                    });
                }
                // 複数バッチにまたがる場合も、最初（最も期限の近い）バッチの番号を使う
                let first = withdrawals.first().cloned().ok_or_else(|| {
                    LogisticsError::Storage("FEFO withdrawal returned no batches".into())
                })?;
                (first.location, first.production_number, withdrawals)
            }
        };

        let codes = self.ctx.codes.pallet_codes(
            PalletCodeRequest {
                product_qr_code: &product.qr_code,
                production_number,
                destination_name: &to.name,
                first_sequence: 1,
                count: req.pallet_quantity as usize,
            },
            now,
        );

        let task = Task {
            id: task_id,
            product_id: product.id,
            product_name: product.name.clone(),
            product_qr_code: product.qr_code.clone(),
            production_number,
            pallet_quantity: req.pallet_quantity,
            assigned_to: req.assigned_to,
            from,
            to: to.to_ref(),
            task_type: req.task_type,
            status: TaskStatus::PendingPickup,
            created_at: now,
            updated_at: now,
            expiration_date,
            pallets: PalletSet::from_codes(codes),
            source_batches,
            deleting: false,
        };

        let reservation = Effect::standing(&task);
        if let Err(err) = self.ctx.swap_effects(None, reservation.as_ref()).await {
            self.undo_creation(&task, None).await;
            log_rejection("task", &err);
            return Err(err);
        }
        if let Err(err) = store.insert_task(task.clone()).await {
            self.undo_creation(&task, reservation.as_ref()).await;
            return Err(err);
        }

        self.ctx.events.emit(DomainEvent::TaskCreated {
            task_id: task.id,
            product_id: task.product_id,
            production_number: task.production_number,
            pallet_quantity: task.pallet_quantity,
            assigned_to: task.assigned_to.clone(),
        });
        tracing::info!(
            task = %task.id,
            production_number = task.production_number,
            pallets = task.pallet_quantity,
            driver = %task.assigned_to,
            "task created"
        );
        Ok(task)
    }

    /// Production line for production-origin tasks; `None` for warehouse
    /// origin (FEFO picks the source).
    async fn resolve_source(&self, req: &CreateTask) -> LogisticsResult<Option<Location>> {
        if !req.task_type.is_production_origin() {
            if req.production_number != ProductionNumberRequest::Auto {
                return Err(LogisticsError::InvalidInput(
                    "warehouse-origin tasks inherit the production number of their stock".into(),
                ));
            }
            if let Some(from_id) = req.from_id {
                let from = require(self.ctx.store.get_location(from_id).await?, "location", from_id)?;
                if from.kind != LocationKind::Warehouse {
                    return Err(LogisticsError::InvalidInput(format!(
                        "{} is not a warehouse",
                        from.name
                    )));
                }
            }
            return Ok(None);
        }
        let from_id = req.from_id.ok_or_else(|| {
            LogisticsError::InvalidInput(format!("{} needs a source location", req.task_type))
        })?;
        let from = require(self.ctx.store.get_location(from_id).await?, "location", from_id)?;
        if from.kind != req.task_type.source_kind() {
            return Err(LogisticsError::InvalidInput(format!(
                "{} is not a {}",
                from.name,
                req.task_type.source_kind()
            )));
        }
        Ok(Some(from))
    }

    /// Rolls back a half-done creation. The production number, if one was
    /// drawn, stays burned.
    async fn undo_creation(&self, task: &Task, reservation: Option<&Effect>) {
        if let Some(r) = reservation {
            self.ctx.compensate(r.location, vec![r.revert.clone()]).await;
        }
        if !task.source_batches.is_empty() {
            // エラーはログ済み
            let _ = self.ctx.restore_withdrawals(task, &task.source_batches).await;
        }
        if task.task_type.is_production_origin() {
            tracing::warn!(
                production_number = task.production_number,
                "production number burned by a failed task creation"
            );
        }
    }

    /// Explicit status change.
    ///
    /// - -> InProgress: no inventory effect
    /// - -> Completed: completion effect, every pallet marked delivered
    #[tracing::instrument(skip(self))]
    pub async fn transition(&self, task_id: TaskId, to: TaskStatus) -> LogisticsResult<Task> {
        let _guard = self.ctx.task_locks.lock(task_id).await;
        let task = self.get_task(task_id).await?;
        if let Err(err) = task.status.check_transition(to) {
            log_rejection("transition", &err);
            return Err(err);
        }
        match to {
            TaskStatus::Completed => {
                self.ctx
                    .complete(&task, |t| {
                        t.pallets.deliver_all();
                        Ok(())
                    })
                    .await
            }
            _ => self.start(&task).await,
        }
    }

    /// PendingPickup -> InProgress. The caller holds the task lock.
    pub(crate) async fn start(&self, task: &Task) -> LogisticsResult<Task> {
        let now = self.ctx.clock.now();
        let started = self
            .ctx
            .store
            .modify_task(
                task.id,
                Box::new(move |t| {
                    t.ensure_live()?;
                    t.advance(TaskStatus::InProgress, now)
                }),
            )
            .await?;
        self.ctx.events.emit(DomainEvent::TaskStatusChanged {
            task_id: started.id,
            from: TaskStatus::PendingPickup,
            to: TaskStatus::InProgress,
        });
        tracing::info!(task = %started.id, "pickup verified, task in progress");
        Ok(started)
    }

    /// Edits destination, quantity or driver.
    ///
    /// The task's standing inventory effect is swapped for the edited one,
    /// so its own prior contribution counts as free space.
    #[tracing::instrument(skip(self, edit))]
    pub async fn edit_task(&self, task_id: TaskId, edit: TaskEdit) -> LogisticsResult<Task> {
        let _guard = self.ctx.task_locks.lock(task_id).await;
        let old = self.get_task(task_id).await?;
        let new_to = match edit.to_id {
            Some(id) if id != old.to.id => {
                let to = require(self.ctx.store.get_location(id).await?, "location", id)?;
                if !old.task_type.accepts_destination(to.kind) {
                    return Err(LogisticsError::InvalidInput(format!(
                        "{} cannot deliver to a {}",
                        old.task_type, to.kind
                    )));
                }
                Some(to)
            }
            _ => None,
        };
        let quantity = edit.pallet_quantity.unwrap_or(old.pallet_quantity);
        if quantity == 0 {
            return Err(LogisticsError::InvalidInput(
                "pallet quantity must be at least 1".into(),
            ));
        }
        if quantity != old.pallet_quantity && !old.source_batches.is_empty() {
            return Err(LogisticsError::InvalidInput(
                "the quantity of a warehouse-origin task is fixed by its stock withdrawal".into(),
            ));
        }

        let now = self.ctx.clock.now();
        let mut new = old.clone();
        if let Some(to) = &new_to {
            new.to = to.to_ref();
        }
        if let Some(driver) = edit.assigned_to {
            new.assigned_to = driver;
        }
        new.pallet_quantity = quantity;
        new.updated_at = now;

        let fresh = if old.status.is_terminal() {
            PalletStatus::Delivered
        } else {
            PalletStatus::Waiting
        };
        let current_len = old.pallets.len();
        let new_codes = if quantity as usize > current_len {
            self.ctx.codes.pallet_codes(
                PalletCodeRequest {
                    product_qr_code: &old.product_qr_code,
                    production_number: old.production_number,
                    destination_name: &new.to.name,
                    first_sequence: current_len + 1,
                    count: quantity as usize - current_len,
                },
                now,
            )
        } else {
            Vec::new()
        };
        new.pallets
            .resize(quantity as usize, new_codes.clone(), fresh)?;

        // 未完了の倉庫行きは完了時まで入庫しないので、ここでは容量だけ確認する
        if !old.status.is_terminal() && !new.is_truck_bound() {
            let to = match &new_to {
                Some(to) => to.clone(),
                None => require(self.ctx.store.get_location(new.to.id).await?, "location", new.to.id)?,
            };
            to.available_space().ensure(&to.name, quantity)?;
        }

        let before = Effect::standing(&old);
        let after = Effect::standing(&new);
        if let Err(err) = self.ctx.swap_effects(before.as_ref(), after.as_ref()).await {
            log_rejection("edit", &err);
            return Err(err);
        }

        let expected = (old.status, old.to.id, old.pallet_quantity);
        let committed = {
            let new = new.clone();
            self.ctx
                .store
                .modify_task(
                    task_id,
                    Box::new(move |t| {
                        t.ensure_live()?;
                        if (t.status, t.to.id, t.pallet_quantity) != expected {
                            return Err(LogisticsError::InvalidInput(format!(
                                "{} changed while being edited",
                                t.id
                            )));
                        }
                        t.pallets.resize(quantity as usize, new_codes, fresh)?;
                        t.to = new.to;
                        t.assigned_to = new.assigned_to;
                        t.pallet_quantity = new.pallet_quantity;
                        t.updated_at = new.updated_at;
                        Ok(())
                    }),
                )
                .await
        };

        match committed {
            Ok(task) => {
                self.ctx.events.emit(DomainEvent::TaskEdited { task_id });
                tracing::info!(task = %task_id, to = %task.to.name, pallets = quantity, "task edited");
                Ok(task)
            }
            Err(err) => {
                tracing::warn!(task = %task_id, error = %err, "edit refused, rolling back");
                self.ctx
                    .roll_back(task_id, after.as_ref(), before.as_ref(), &err)
                    .await;
                Err(err)
            }
        }
    }

    /// Deletes a task after reverting its inventory effects.
    ///
    /// Returns `false` when there was nothing to delete (missing task, or a
    /// delete already in flight).
    #[tracing::instrument(skip(self))]
    pub async fn delete_task(&self, task_id: TaskId) -> LogisticsResult<bool> {
        let _guard = self.ctx.task_locks.lock(task_id).await;
        // tombstone を立てて、以降の scan / edit / 2 回目の delete を止める
        let marked = self
            .ctx
            .store
            .modify_task(
                task_id,
                Box::new(|t| {
                    t.ensure_live()?;
                    t.deleting = true;
                    Ok(())
                }),
            )
            .await;
        let task = match marked {
            Ok(task) => task,
            Err(LogisticsError::InvalidReference { .. }) => {
                tracing::info!(task = %task_id, "nothing to delete");
                return Ok(false);
            }
            Err(err) => return Err(err),
        };

        if let Some(effect) = Effect::standing(&task) {
            if let Err(err) = self.ctx.apply(effect.location, vec![effect.revert.clone()]).await {
                tracing::error!(task = %task_id, error = %err, "delete aborted");
                let cleared = self
                    .ctx
                    .store
                    .modify_task(
                        task_id,
                        Box::new(|t| {
                            t.deleting = false;
                            Ok(())
                        }),
                    )
                    .await;
                if let Err(clear) = cleared {
                    tracing::error!(
                        task = %task_id,
                        error = %clear,
                        "could not clear the delete mark; task stays hidden until repaired"
                    );
                }
                return Err(err);
            }
        }

        if self.ctx.settings.restore_withdrawals_on_delete && !task.source_batches.is_empty() {
            // 戻せなかった分はログに残し、削除自体は続行する
            let _ = self
                .ctx
                .restore_withdrawals(&task, &task.source_batches)
                .await;
        }

        self.ctx.store.remove_task(task_id).await?;
        self.ctx.events.emit(DomainEvent::TaskDeleted { task_id });
        tracing::info!(task = %task_id, status = %task.status, "task deleted");
        Ok(true)
    }
}
