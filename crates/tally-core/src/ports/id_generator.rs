//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: Clock の時刻 + 乱数で ULID を作る

use std::sync::Arc;

use ulid::Ulid;

use crate::domain::EntryId;
use crate::ports::Clock;

pub trait IdGenerator: Send + Sync {
    fn generate_entry_id(&self) -> EntryId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// FixedClock を渡せば timestamp 部分が決定的になる。
pub struct UlidGenerator {
    clock: Arc<dyn Clock>,
}

impl UlidGenerator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl IdGenerator for UlidGenerator {
    fn generate_entry_id(&self) -> EntryId {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        EntryId::from(ulid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn ulid_generator_generates_unique_ids() {
        let id_gen = UlidGenerator::new(Arc::new(SystemClock));
        let id1 = id_gen.generate_entry_id();
        let id2 = id_gen.generate_entry_id();
        assert_ne!(id1, id2);
        assert!(id1.to_string().starts_with("entry-"));
    }

    #[test]
    fn ulid_generator_uses_clock_timestamp() {
        let fixed_time = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap();
        let id_gen = UlidGenerator::new(Arc::new(FixedClock::new(fixed_time)));

        let id1 = id_gen.generate_entry_id();
        let id2 = id_gen.generate_entry_id();
        assert_ne!(id1, id2);

        let timestamp1 = (id1.as_ulid().0 >> 80) as u64;
        let timestamp2 = (id2.as_ulid().0 >> 80) as u64;
        assert_eq!(timestamp1, timestamp2);
        assert_eq!(timestamp1, fixed_time.timestamp_millis() as u64);
    }
}
