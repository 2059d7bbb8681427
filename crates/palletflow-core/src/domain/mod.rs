//! Domain model (IDs, inventory ledger, tasks, pallets, errors, events).
//!
//! I/O を持たない純粋なモジュールだけを置きます。
//! 永続化や時刻・ID 生成は ports 側の責務です。

pub mod capacity;
pub mod errors;
pub mod events;
pub mod fefo;
pub mod ids;
pub mod inventory;
pub mod location;
pub mod pallet;
pub mod product;
pub mod task;

pub use self::capacity::Space;
pub use self::errors::{ErrorKind, LogisticsError, LogisticsResult};
pub use self::events::DomainEvent;
pub use self::fefo::{Withdrawal, plan_withdrawal};
pub use self::ids::{DriverId, LocationId, ProductId, TaskId};
pub use self::inventory::{
    Allocation, Batch, BatchKey, BatchStatus, LocationInventory, ProductInventory,
};
pub use self::location::{InventoryOp, Location, LocationKind, LocationRef};
pub use self::pallet::{Pallet, PalletSet, PalletStatus};
pub use self::product::{DEFAULT_EXPIRY_DAYS, Product};
pub use self::task::{Task, TaskStatus, TaskType};
