//! Scan Verifier - ドライバーの QR スキャンを検証してタスクを進める
//!
//! # スキャンの種類
//! - Pickup: 出発地の QR。teslim_alma_dogrulama -> devam_ediyor
//! - Pallet: パレットの QR。beklemede -> forklift_üstünde
//! - Delivery: 行き先の QR。forklift_üstünde のパレットを全部 teslim_edildi に。
//!   全パレットが届いたらタスクを完了し、製品の stock を加算する

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::context::{AppContext, log_rejection, require};
use super::orchestrator::Orchestrator;
use crate::domain::{
    DomainEvent, DriverId, LogisticsError, LogisticsResult, PalletStatus, Task, TaskId,
    TaskStatus,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    Pickup,
    Pallet,
    Delivery,
}

impl ScanMode {
    /// Task status this scan is valid in.
    fn expected_status(self) -> TaskStatus {
        match self {
            ScanMode::Pickup => TaskStatus::PendingPickup,
            ScanMode::Pallet | ScanMode::Delivery => TaskStatus::InProgress,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    pub task: Task,
    /// Pallets delivered by this scan (delivery scans only).
    pub delivered: usize,
    pub completed: bool,
}

#[derive(Clone)]
pub struct Scanner {
    ctx: Arc<AppContext>,
    orchestrator: Orchestrator,
}

impl Scanner {
    pub(crate) fn new(ctx: Arc<AppContext>, orchestrator: Orchestrator) -> Self {
        Self { ctx, orchestrator }
    }

    #[tracing::instrument(skip(self, driver, code), fields(driver = %driver))]
    pub async fn scan(
        &self,
        task_id: TaskId,
        driver: &DriverId,
        mode: ScanMode,
        code: &str,
    ) -> LogisticsResult<ScanOutcome> {
        let _guard = self.ctx.task_locks.lock(task_id).await;
        let result = self.verify(task_id, driver, mode, code).await;
        if let Err(err) = &result {
            log_rejection("scan", err);
        }
        result
    }

    async fn verify(
        &self,
        task_id: TaskId,
        driver: &DriverId,
        mode: ScanMode,
        code: &str,
    ) -> LogisticsResult<ScanOutcome> {
        let task = require(self.ctx.store.get_task(task_id).await?, "task", task_id)?;
        task.ensure_live()?;

        if self.ctx.settings.enforce_driver_assignment && task.assigned_to != *driver {
            return Err(LogisticsError::verification_failed(format!(
                "task is assigned to {}",
                task.assigned_to
            )));
        }
        if task.status != mode.expected_status() {
            return Err(LogisticsError::verification_failed(format!(
                "a {mode:?} scan is not valid while the task is {}",
                task.status
            )));
        }

        match mode {
            ScanMode::Pickup => self.pickup(&task, code).await,
            ScanMode::Pallet => self.pallet(&task, code).await,
            ScanMode::Delivery => self.delivery(&task, code).await,
        }
    }

    async fn pickup(&self, task: &Task, code: &str) -> LogisticsResult<ScanOutcome> {
        if code != task.from.qr_code {
            return Err(LogisticsError::verification_failed(format!(
                "scanned code does not match pickup location {}",
                task.from.name
            )));
        }
        let task = self.orchestrator.start(task).await?;
        Ok(ScanOutcome {
            task,
            delivered: 0,
            completed: false,
        })
    }

    async fn pallet(&self, task: &Task, code: &str) -> LogisticsResult<ScanOutcome> {
        let now = self.ctx.clock.now();
        let scanned = code.to_string();
        let task = self
            .ctx
            .store
            .modify_task(
                task.id,
                Box::new(move |t| {
                    t.ensure_live()?;
                    if t.status != TaskStatus::InProgress {
                        return Err(LogisticsError::verification_failed(
                            "task is no longer in progress",
                        ));
                    }
                    t.pallets.load_onto_forklift(&scanned)?;
                    t.updated_at = now;
                    Ok(())
                }),
            )
            .await?;
        self.ctx.events.emit(DomainEvent::PalletScanned {
            task_id: task.id,
            code: code.to_string(),
            status: PalletStatus::OnForklift,
        });
        tracing::info!(
            task = %task.id,
            on_forklift = task.pallets.count(PalletStatus::OnForklift),
            "pallet loaded onto forklift"
        );
        Ok(ScanOutcome {
            task,
            delivered: 0,
            completed: false,
        })
    }

    async fn delivery(&self, task: &Task, code: &str) -> LogisticsResult<ScanOutcome> {
        if code != task.to.qr_code {
            return Err(LogisticsError::verification_failed(format!(
                "scanned code does not match destination {}",
                task.to.name
            )));
        }

        // 先にコピーで試して、最後の一回かどうかを判定する
        let mut preview = task.pallets.clone();
        let delivered = preview.deliver_forklift_load()?;

        if preview.all_delivered() {
            let completed = self
                .ctx
                .complete(task, |t| {
                    t.pallets.deliver_forklift_load()?;
                    if !t.pallets.all_delivered() {
                        return Err(LogisticsError::verification_failed(
                            "pallets changed during delivery",
                        ));
                    }
                    Ok(())
                })
                .await?;
            self.ctx
                .store
                .increment_product_stock(completed.product_id, u64::from(completed.pallet_quantity))
                .await?;
            self.ctx.events.emit(DomainEvent::PalletsDelivered {
                task_id: completed.id,
                delivered,
                remaining: 0,
            });
            return Ok(ScanOutcome {
                task: completed,
                delivered,
                completed: true,
            });
        }

        let now = self.ctx.clock.now();
        let task = self
            .ctx
            .store
            .modify_task(
                task.id,
                Box::new(move |t| {
                    t.ensure_live()?;
                    if t.status != TaskStatus::InProgress {
                        return Err(LogisticsError::verification_failed(
                            "task is no longer in progress",
                        ));
                    }
                    t.pallets.deliver_forklift_load()?;
                    t.updated_at = now;
                    Ok(())
                }),
            )
            .await?;
        let remaining = task.pallets.len() - task.pallets.count(PalletStatus::Delivered);
        self.ctx.events.emit(DomainEvent::PalletsDelivered {
            task_id: task.id,
            delivered,
            remaining,
        });
        tracing::info!(task = %task.id, delivered, remaining, "pallets delivered");
        Ok(ScanOutcome {
            task,
            delivered,
            completed: false,
        })
    }
}
