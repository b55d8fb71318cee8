pub mod lru;

pub use lru::{FixHint, LruReplacer};
