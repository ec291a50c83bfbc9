//! Ports - 抽象化レイヤー
//!
//! 外部システム（バックエンド API、時計、ID 採番）へのインターフェース。
//! テストでは InMemoryBackend / FixedClock に差し替える。

pub mod backend;
pub mod clock;
pub mod id_generator;

pub use self::backend::{AuthToken, LoginResponse, TaskBackend};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
