//! Task record and its status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::{LogisticsError, LogisticsResult};
use super::fefo::Withdrawal;
use super::ids::{DriverId, ProductId, TaskId};
use super::location::{LocationKind, LocationRef};
use super::pallet::PalletSet;

/// Task status.
///
/// State transitions (linear):
/// - PendingPickup -> InProgress -> Completed
///
/// Wire names are kept from the field app (`teslim_alma_dogrulama`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Waiting for the driver to verify the pickup location.
    #[serde(rename = "teslim_alma_dogrulama")]
    PendingPickup,

    /// Pickup verified, pallets on the move.
    #[serde(rename = "devam_ediyor")]
    InProgress,

    /// Every pallet delivered (or closed by an admin).
    #[serde(rename = "tamamlandı")]
    Completed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::PendingPickup => "teslim_alma_dogrulama",
            TaskStatus::InProgress => "devam_ediyor",
            TaskStatus::Completed => "tamamlandı",
        }
    }

    pub fn next(self) -> Option<TaskStatus> {
        match self {
            TaskStatus::PendingPickup => Some(TaskStatus::InProgress),
            TaskStatus::InProgress => Some(TaskStatus::Completed),
            TaskStatus::Completed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed)
    }

    /// Checks `self -> to` is on the allowed path.
    pub fn check_transition(self, to: TaskStatus) -> LogisticsResult<()> {
        if self.next() == Some(to) {
            Ok(())
        } else {
            Err(LogisticsError::InvalidTransition { from: self, to })
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskType {
    ProductionToWarehouse,
    ProductionToTruck,
    WarehouseToTruck,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::ProductionToWarehouse => "productionToWarehouse",
            TaskType::ProductionToTruck => "productionToTruck",
            TaskType::WarehouseToTruck => "warehouseToTruck",
        }
    }

    /// Production-origin tasks get a fresh production number.
    pub fn is_production_origin(self) -> bool {
        matches!(
            self,
            TaskType::ProductionToWarehouse | TaskType::ProductionToTruck
        )
    }

    pub fn source_kind(self) -> LocationKind {
        if self.is_production_origin() {
            LocationKind::ProductionLine
        } else {
            LocationKind::Warehouse
        }
    }

    /// `warehouseToTruck` also covers deliveries from stock to a delivery point.
    pub fn accepts_destination(self, kind: LocationKind) -> bool {
        match self {
            TaskType::ProductionToWarehouse => kind == LocationKind::Warehouse,
            TaskType::ProductionToTruck => kind == LocationKind::Truck,
            TaskType::WarehouseToTruck => {
                matches!(kind, LocationKind::Truck | LocationKind::DeliveryPoint)
            }
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task record: one driver assignment.
///
/// - Name/code fields are snapshots and never follow later catalog edits.
/// - The pallet set is owned exclusively by this record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub product_id: ProductId,
    pub product_name: String,
    pub product_qr_code: String,
    pub production_number: u64,
    pub pallet_quantity: u32,
    pub assigned_to: DriverId,
    pub from: LocationRef,
    pub to: LocationRef,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expiration_date: DateTime<Utc>,
    pub pallets: PalletSet,

    /// Warehouse batches consumed at creation (warehouse-origin tasks only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_batches: Vec<Withdrawal>,

    /// Set while a delete is reverting this task's inventory effects.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleting: bool,
}

impl Task {
    /// Moves to `to`, which must be the next status.
    pub fn advance(&mut self, to: TaskStatus, now: DateTime<Utc>) -> LogisticsResult<()> {
        self.status.check_transition(to)?;
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    pub fn is_truck_bound(&self) -> bool {
        self.to.kind == LocationKind::Truck
    }

    pub fn ensure_live(&self) -> LogisticsResult<()> {
        if self.deleting {
            return Err(LogisticsError::invalid_reference("task", self.id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::pickup(TaskStatus::PendingPickup, TaskStatus::InProgress)]
    #[case::complete(TaskStatus::InProgress, TaskStatus::Completed)]
    fn allowed_transitions(#[case] from: TaskStatus, #[case] to: TaskStatus) {
        assert!(from.check_transition(to).is_ok());
    }

    #[rstest]
    #[case::skip(TaskStatus::PendingPickup, TaskStatus::Completed)]
    #[case::reopen(TaskStatus::Completed, TaskStatus::InProgress)]
    #[case::back_to_pending(TaskStatus::InProgress, TaskStatus::PendingPickup)]
    #[case::same(TaskStatus::InProgress, TaskStatus::InProgress)]
    fn rejected_transitions(#[case] from: TaskStatus, #[case] to: TaskStatus) {
        assert_eq!(
            from.check_transition(to),
            Err(LogisticsError::InvalidTransition { from, to })
        );
    }

    #[test]
    fn completed_is_terminal() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
    }

    #[rstest]
    #[case(TaskType::ProductionToWarehouse, LocationKind::Warehouse, true)]
    #[case(TaskType::ProductionToWarehouse, LocationKind::Truck, false)]
    #[case(TaskType::ProductionToTruck, LocationKind::Truck, true)]
    #[case(TaskType::WarehouseToTruck, LocationKind::Truck, true)]
    #[case(TaskType::WarehouseToTruck, LocationKind::DeliveryPoint, true)]
    #[case(TaskType::WarehouseToTruck, LocationKind::Warehouse, false)]
    fn destination_kinds(
        #[case] task_type: TaskType,
        #[case] kind: LocationKind,
        #[case] accepted: bool,
    ) {
        assert_eq!(task_type.accepts_destination(kind), accepted);
    }

    #[test]
    fn status_uses_field_app_wire_names() {
        let json = serde_json::to_string(&TaskStatus::Completed).unwrap();
        assert_eq!(json, "\"tamamlandı\"");
        let ty = serde_json::to_string(&TaskType::WarehouseToTruck).unwrap();
        assert_eq!(ty, "\"warehouseToTruck\"");
    }
}
