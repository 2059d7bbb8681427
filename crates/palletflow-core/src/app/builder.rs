//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 差し替えない port はデフォルト実装で埋める

use std::sync::Arc;

use super::catalog::Catalog;
use super::context::{AppContext, TaskLocks};
use super::orchestrator::Orchestrator;
use super::reports::Reports;
use super::scanner::Scanner;
use crate::config::Settings;
use crate::impls::{InMemoryStore, TracingEventSink};
use crate::ports::{
    Clock, CodeGenerator, DefaultCodeGenerator, EventSink, IdGenerator, LogisticsStore,
    SystemClock, UlidGenerator,
};

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new()
///     .store(Arc::new(InMemoryStore::new()))
///     .settings(Settings::load()?)
///     .build()?;
/// ```
///
/// # デフォルト
/// - store: InMemoryStore
/// - clock: SystemClock
/// - id_generator: 同じ clock を使う UlidGenerator
/// - code_generator: DefaultCodeGenerator
/// - event_sink: TracingEventSink
#[derive(Default)]
pub struct AppBuilder {
    store: Option<Arc<dyn LogisticsStore>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    codes: Option<Arc<dyn CodeGenerator>>,
    events: Option<Arc<dyn EventSink>>,
    settings: Settings,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
}

impl AppBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(mut self, store: Arc<dyn LogisticsStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn code_generator(mut self, codes: Arc<dyn CodeGenerator>) -> Self {
        self.codes = Some(codes);
        self
    }

    pub fn event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// AppBuilder を構築して App を生成
    ///
    /// # 検証
    /// - default_expiry_days が 0 なら BuildError::InvalidSettings
    pub fn build(self) -> Result<App, BuildError> {
        if self.settings.default_expiry_days == 0 {
            return Err(BuildError::InvalidSettings(
                "default_expiry_days must be positive".into(),
            ));
        }
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(clock.clone())));
        let ctx = Arc::new(AppContext {
            store: self.store.unwrap_or_else(|| Arc::new(InMemoryStore::new())),
            clock,
            ids,
            codes: self.codes.unwrap_or_else(|| Arc::new(DefaultCodeGenerator)),
            events: self.events.unwrap_or_else(|| Arc::new(TracingEventSink)),
            settings: self.settings,
            task_locks: TaskLocks::default(),
        });

        let orchestrator = Orchestrator::new(ctx.clone());
        Ok(App {
            scanner: Scanner::new(ctx.clone(), orchestrator.clone()),
            catalog: Catalog::new(ctx.clone()),
            reports: Reports::new(ctx.clone()),
            orchestrator,
            settings: ctx.settings.clone(),
        })
    }
}

/// App は組み立て済みのサービス群
///
/// どのサービスも同じ store / clock / settings を共有します。
#[derive(Clone)]
pub struct App {
    pub orchestrator: Orchestrator,
    pub scanner: Scanner,
    pub catalog: Catalog,
    pub reports: Reports,
    pub settings: Settings,
}
