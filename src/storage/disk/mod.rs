// SimpleDBM Storage Containers

pub mod container;
pub mod error;
pub mod storage_manager;

pub use container::{FileStorageContainer, FileStorageContainerFactory, StorageContainer, StorageContainerFactory};
pub use error::ContainerError;
pub use storage_manager::StorageManager;
