//! EventSink port - イベント記録の抽象化
//!
//! # 実装
//! - TracingEventSink: tracing の構造化イベントとして出力
//! - MemoryEventSink: テスト・監査用にメモリへ記録

use crate::domain::DomainEvent;

/// EventSink はドメインイベントを記録
///
/// 記録の失敗で業務操作を失敗させないため、戻り値はありません。
pub trait EventSink: Send + Sync {
    fn emit(&self, event: DomainEvent);
}
