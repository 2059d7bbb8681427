//! Errors - エラー型と分類
//!
//! `LogisticsError` はすべての操作が呼び出し元に返すエラーです。
//! どれも自動リトライはしません。`ErrorKind` は運用上の分類です。

use thiserror::Error;

use super::task::TaskStatus;

/// ErrorKind は実行エラーの分類
///
/// - Terminal: 入力やタスク状態を直さない限り何度やっても失敗する
/// - Infrastructure: ストア側の障害
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Terminal,
    Infrastructure,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LogisticsError {
    #[error("unknown {kind}: {id}")]
    InvalidReference { kind: &'static str, id: String },

    #[error(
        "capacity exceeded at {location}: requested {requested} pallets, {available} available"
    )]
    CapacityExceeded {
        location: String,
        requested: u32,
        available: u32,
    },

    #[error("insufficient stock of {product}: requested {requested} pallets, {available} available")]
    InsufficientStock {
        product: String,
        requested: u32,
        available: u32,
    },

    #[error("verification failed: {reason}")]
    VerificationFailed { reason: String },

    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl LogisticsError {
    pub fn invalid_reference(kind: &'static str, id: impl ToString) -> Self {
        Self::InvalidReference {
            kind,
            id: id.to_string(),
        }
    }

    pub fn verification_failed(reason: impl Into<String>) -> Self {
        Self::VerificationFailed {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Storage(_) => ErrorKind::Infrastructure,
            _ => ErrorKind::Terminal,
        }
    }
}

pub type LogisticsResult<T> = Result<T, LogisticsError>;
