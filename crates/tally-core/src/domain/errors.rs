//! Errors - エラー型と分類
//!
//! SessionExpired だけが core の外へ伝播する。それ以外は core 内で処理され、
//! スナップショットの `error` フィールドで UI に伝わる。

use std::time::Duration;

use thiserror::Error;

use super::ids::TemplateId;

/// ErrorKind は実行エラーの運用分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Authorization lost; clear everything and log out. Never retried.
    SessionExpired,
    /// Backend or network hiccup; retried with backoff.
    Transient,
    /// Caller asked for something the local aggregate cannot satisfy.
    Invariant,
    /// Backend refused the request outright (bad credentials, ...).
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("session expired")]
    SessionExpired,

    #[error("failed to fetch tasks: {0}")]
    FetchFailed(String),

    #[error("status transition failed: {0}")]
    TransitionFailed(String),

    #[error("login failed: {0}")]
    LoginFailed(String),

    #[error("backend call timed out after {0:?}")]
    Timeout(Duration),

    #[error("no pending task left in aggregate {0}")]
    NoPendingTask(TemplateId),

    #[error("no done task left in aggregate {0}")]
    NoDoneTask(TemplateId),
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::SessionExpired => ErrorKind::SessionExpired,
            SyncError::FetchFailed(_) | SyncError::TransitionFailed(_) | SyncError::Timeout(_) => {
                ErrorKind::Transient
            }
            SyncError::NoPendingTask(_) | SyncError::NoDoneTask(_) => ErrorKind::Invariant,
            SyncError::LoginFailed(_) => ErrorKind::Rejected,
        }
    }

    pub fn is_session_expired(&self) -> bool {
        self.kind() == ErrorKind::SessionExpired
    }
}
