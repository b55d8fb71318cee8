// SimpleDBM Common Module

pub mod config;
pub mod registry;
pub mod stats;
pub mod types;
pub mod worker;

pub use config::DatabaseConfig;
pub use registry::{ObjectRegistry, RegistryError};
pub use stats::{Statistic, StatisticSnapshot};
pub use types::{FrameId, Lsn, OwnerId, Page, PageId, TxnId, PAGE_HEADER_SIZE, PAGE_SIZE};
pub use worker::BackgroundWorker;
