//! TaskBackend port - リモート REST API の抽象化
//!
//! HTTP の詳細（エンドポイント、payload 形式）はこの trait の実装側に閉じる。
//! 実装はエラーを次のように写像すること:
//! - 認可失敗（401 相当） → `SyncError::SessionExpired`
//! - 取得系のその他の失敗 → `SyncError::FetchFailed`
//! - 遷移系のその他の失敗 → `SyncError::TransitionFailed`
//!
//! タイムアウトは呼び出し側（engine）が `request_timeout` で課す。

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{ActionStatus, RawActionRecord, RecordId, SyncError, User};

/// Bearer token issued by `login`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Tokens never show up in logs.
impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(***)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: AuthToken,
    pub user: User,
}

#[async_trait]
pub trait TaskBackend: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, SyncError>;

    async fn fetch_tasks_by_status(
        &self,
        token: &AuthToken,
        status: ActionStatus,
    ) -> Result<Vec<RawActionRecord>, SyncError>;

    /// Move one record to `status`. Returns the record as stored by the backend.
    async fn transition_status(
        &self,
        token: &AuthToken,
        record: &RecordId,
        status: ActionStatus,
    ) -> Result<RawActionRecord, SyncError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_redacted_in_debug_output() {
        let token = AuthToken::new("secret-value");
        assert_eq!(format!("{token:?}"), "AuthToken(***)");
        assert_eq!(token.as_str(), "secret-value");
    }
}
