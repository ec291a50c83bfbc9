//! App - アプリケーション層
//!
//! ports を組み合わせて同期コアを実装する。
//!
//! # 主要コンポーネント
//! - **SyncEngine**: セッション・enqueue・照合の窓口（engine.rs）
//! - **StateStore**: 状態の正本と購読者通知
//! - **processor**: 単一ドレインループ（再試行・バックオフ・refresh）
//! - **revert**: 再試行が尽きた intent の補償
//! - **reconciler**: 定期照合と conflict の自動解除
//! - **fetch**: 3 ステータスの取得と週ウィンドウでの集約

pub mod engine;
pub mod fetch;
mod processor;
pub mod reconciler;
pub mod revert;
pub mod store;


pub use self::engine::{EngineBuilder, SyncEngine};
pub use self::fetch::build_aggregates;
pub use self::reconciler::{ReconcileOutcome, reconcile};
pub use self::revert::revert;
pub use self::store::{StateStore, Subscription};
