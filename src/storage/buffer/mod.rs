// SimpleDBM Buffer Pool

pub mod access;
pub mod error;
pub mod manager;
mod replacer;

#[cfg(test)]
mod tests;

pub use access::BufferAccessBlock;
pub use error::BufferPoolError;
pub use manager::{BufferManager, BufferManagerConfig, DirtyPageInfo};
pub use replacer::FixHint;
