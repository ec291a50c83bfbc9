//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryBackend**: TaskBackend のインメモリ版（障害注入つき）
//!
//! HTTP クライアント実装はこの crate の外に置く。

pub mod inmem_backend;

pub use self::inmem_backend::{BackendCalls, FailureMode, InMemoryBackend};
