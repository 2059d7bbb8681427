//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports の実装を含めます。
//!
//! # 含まれる実装
//! - **InMemoryStore**: 開発・テスト用の LogisticsStore
//! - **TracingEventSink**: tracing へ出力する EventSink
//! - **MemoryEventSink**: テスト・監査用に記録する EventSink

pub mod event_sinks;
pub mod inmem_store;

// 主要な型を再エクスポート
pub use self::event_sinks::{MemoryEventSink, TracingEventSink};
pub use self::inmem_store::InMemoryStore;
