//! Rate aggregation, history maintenance and snapshot output

pub mod aggregator;
pub mod generate;
pub mod history;
pub mod snapshot;

pub use aggregator::RateAggregator;
pub use generate::{generate, GenerateOptions, GenerateReport};
pub use history::{merge, HistoryRepository, HistoryStore, JsonHistoryFile, MemoryHistory};
pub use snapshot::{ApiSnapshot, SnapshotWriter};
