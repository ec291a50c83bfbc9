//! tally-core
//!
//! Optimistic-update sync core for a task-tracking client.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, raw record, aggregate, week window, state, errors）
//! - **ports**: 抽象化レイヤー（TaskBackend, Clock, IdGenerator）
//! - **queue**: mutation queue（intent + 末尾の refresh）と RetryPolicy
//! - **app**: SyncEngine, StateStore, ドレイン処理, revert, 定期照合
//! - **impls**: 実装（InMemoryBackend など開発用）
//! - **config**: 既定値 → ファイル → 環境変数 の順で重ねる設定
//!
//! # 使用例
//! ```ignore
//! let engine = SyncEngine::builder(backend).config(SyncConfig::load(None)?).build()?;
//! engine.login("ana@example.com", "secret").await?;
//! engine.enqueue_action(&TemplateId::new("call-customers"), Action::Increment);
//! engine.wait_until_idle().await;
//! ```

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod queue;
pub mod status;

pub use app::{StateStore, Subscription, SyncEngine};
pub use config::{ConfigError, SyncConfig};
pub use domain::{Action, AppState, SyncError, TaskAggregate, TemplateId};
pub use status::QueueStatus;
