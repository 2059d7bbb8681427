//! palletflow-core
//!
//! Inventory and task state-transition core for pallet logistics.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, inventory, location, capacity, fefo, pallet, task, errors, events）
//! - **ports**: 抽象化レイヤー（LogisticsStore, Clock, IdGenerator, CodeGenerator, EventSink）
//! - **app**: アプリケーションロジック（builder, orchestrator, scanner, catalog, reports）
//! - **impls**: 実装（InMemoryStore, TracingEventSink, MemoryEventSink）
//! - **config**: 設定の読み込み

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
