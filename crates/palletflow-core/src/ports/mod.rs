//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（永続化ストア、時計、ID 発行、コード生成、
//! イベント送信先）へのインターフェースを提供し、実装の詳細を隠蔽します。

pub mod clock;
pub mod code_generator;
pub mod event_sink;
pub mod id_generator;
pub mod store;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::code_generator::{CodeGenerator, DefaultCodeGenerator, PalletCodeRequest};
pub use self::event_sink::EventSink;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::store::{LogisticsStore, TaskMutator};
