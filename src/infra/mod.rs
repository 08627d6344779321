//! Network access, flat-file caches and reference data.

pub mod cache;
pub mod mars;
pub mod reference;
pub mod weight_store;

pub use cache::{CacheError, FlatFileCache};
pub use mars::{MarsClient, MarsClientError, ReportQuery};
pub use reference::{NetWeightTable, ReferenceError, WeightRules};
pub use weight_store::{CsvStoreError, CsvWeightStore, MemoryWeightStore};
