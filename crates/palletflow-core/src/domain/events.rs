//! Events - ドメインイベント
//!
//! Orchestrator と Scan Verifier が状態を変えるたびに 1 件発行します。
//! 送り先は `EventSink` port（tracing への書き出し、テスト用の記録など）。

use serde::{Deserialize, Serialize};

use super::ids::{DriverId, LocationId, ProductId, TaskId};
use super::pallet::PalletStatus;
use super::task::TaskStatus;

/// DomainEvent はドメインで発生したイベント
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    TaskCreated {
        task_id: TaskId,
        product_id: ProductId,
        production_number: u64,
        pallet_quantity: u32,
        assigned_to: DriverId,
    },
    TaskStatusChanged {
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },
    TaskEdited {
        task_id: TaskId,
    },
    TaskDeleted {
        task_id: TaskId,
    },
    PalletScanned {
        task_id: TaskId,
        code: String,
        status: PalletStatus,
    },
    PalletsDelivered {
        task_id: TaskId,
        delivered: usize,
        remaining: usize,
    },
    /// One committed per-location inventory update.
    InventoryChanged {
        location_id: LocationId,
        product_id: ProductId,
        delta: i64,
    },
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::TaskCreated { .. } => "task_created",
            DomainEvent::TaskStatusChanged { .. } => "task_status_changed",
            DomainEvent::TaskEdited { .. } => "task_edited",
            DomainEvent::TaskDeleted { .. } => "task_deleted",
            DomainEvent::PalletScanned { .. } => "pallet_scanned",
            DomainEvent::PalletsDelivered { .. } => "pallets_delivered",
            DomainEvent::InventoryChanged { .. } => "inventory_changed",
        }
    }

    /// Task the event is about, if any.
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            DomainEvent::TaskCreated { task_id, .. }
            | DomainEvent::TaskStatusChanged { task_id, .. }
            | DomainEvent::TaskEdited { task_id }
            | DomainEvent::TaskDeleted { task_id }
            | DomainEvent::PalletScanned { task_id, .. }
            | DomainEvent::PalletsDelivered { task_id, .. } => Some(*task_id),
            DomainEvent::InventoryChanged { .. } => None,
        }
    }
}
