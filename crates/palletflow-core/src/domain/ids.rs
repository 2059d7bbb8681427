//! Domain identifiers (strongly-typed IDs).
//!
//! # ULID ベースの ID + Phantom type
//! Product / Location / Task は ULID を使います。生成順でソートでき、
//! 調整なしで複数ノードから発行できます。
//!
//! `Id<T>` の `T` は実行時には使わないマーカー型で、
//! `ProductId` と `LocationId` を取り違えるとコンパイルエラーになります。
//!
//! ドライバー ID だけは外部の Identity provider が発行する文字列なので
//! `DriverId` として別に定義しています。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"prd-", "loc-", "task-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

// ========================================
// マーカー型の定義
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Product {}

impl IdMarker for Product {
    fn prefix() -> &'static str {
        "prd-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Location {}

impl IdMarker for Location {
    fn prefix() -> &'static str {
        "loc-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl IdMarker for Task {
    fn prefix() -> &'static str {
        "task-"
    }
}

/// Identifier of a Product (catalog entry).
pub type ProductId = Id<Product>;

/// Identifier of a Location (warehouse, truck, delivery point, production line).
pub type LocationId = Id<Location>;

/// Identifier of a Task (one driver assignment).
pub type TaskId = Id<Task>;

/// Driver identity as supplied by the authentication collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriverId(String);

impl DriverId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let ulid1 = Ulid::new();
        let ulid2 = Ulid::new();
        let ulid3 = Ulid::new();

        let product = ProductId::from_ulid(ulid1);
        let location = LocationId::from_ulid(ulid2);
        let task = TaskId::from_ulid(ulid3);

        assert_eq!(product.as_ulid(), ulid1);
        assert_eq!(location.as_ulid(), ulid2);
        assert_eq!(task.as_ulid(), ulid3);

        assert!(product.to_string().starts_with("prd-"));
        assert!(location.to_string().starts_with("loc-"));
        assert!(task.to_string().starts_with("task-"));

        // let _: ProductId = task; // <- does not compile
    }

    #[test]
    fn ids_serialize_as_bare_ulid() {
        let ulid = Ulid::new();
        let task_id = TaskId::from_ulid(ulid);

        let serialized = serde_json::to_string(&task_id).unwrap();
        assert_eq!(serialized, format!("\"{ulid}\""));

        let deserialized: TaskId = serde_json::from_str(&serialized).unwrap();
        assert_eq!(task_id, deserialized);
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;

        assert_eq!(size_of::<ProductId>(), size_of::<Ulid>());
        assert_eq!(size_of::<TaskId>(), 16);
    }

    #[test]
    fn driver_id_displays_raw_value() {
        let driver = DriverId::new("sofor-7");
        assert_eq!(driver.to_string(), "sofor-7");
        assert_eq!(driver.as_str(), "sofor-7");
    }
}
