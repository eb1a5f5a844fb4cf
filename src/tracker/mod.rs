//! Endorsement period tracking

pub mod daycount;
pub mod service;
pub mod store;

pub use daycount::{ceil_days, count_period_days, PeriodTotals, BACKDATE_POSITION, MS_PER_DAY};
pub use service::{cumulative_at, CumulativeTotals, EndorsementTracker, TotalsPatch};
pub use store::{HistoryStore, MemoryHistoryStore, MongoHistoryStore};
