//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: アプリケーションの構築とワイヤリング
//! - **Orchestrator**: タスクの作成・遷移・編集・削除と inventory 伝播
//! - **Scanner**: QR スキャンの検証（pickup / pallet / delivery）
//! - **Catalog**: 製品・ロケーションのマスタ管理
//! - **Reports**: 読み取り専用の集計

pub mod builder;
pub mod catalog;
mod context;
pub mod orchestrator;
pub mod reports;
pub mod scanner;

// 主要な型を再エクスポート
pub use self::builder::{App, AppBuilder, BuildError};
pub use self::catalog::{Catalog, ProductUpdate};
pub use self::orchestrator::{CreateTask, Orchestrator, ProductionNumberRequest, TaskEdit};
pub use self::reports::{
    DriverCounts, ExpiringBatch, LocationStats, ProductDistribution, ProductLoad, Reports,
    TaskSummary, WarehouseShare,
};
pub use self::scanner::{ScanMode, ScanOutcome, Scanner};
