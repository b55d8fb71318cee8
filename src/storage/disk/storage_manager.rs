// SimpleDBM Storage Manager
//
// Tracks the open containers by id.

use std::collections::HashMap;
use std::sync::Arc;

use log::info;
use parking_lot::RwLock;

use crate::storage::disk::container::{StorageContainer, StorageContainerFactory};
use crate::storage::disk::error::{ContainerError, Result};

const CONTAINER_PREFIX: &str = "container_";
const CONTAINER_SUFFIX: &str = ".dat";

pub struct StorageManager {
    factory: Arc<dyn StorageContainerFactory>,
    containers: RwLock<HashMap<i32, Arc<dyn StorageContainer>>>,
}

impl StorageManager {
    pub fn new(factory: Arc<dyn StorageContainerFactory>) -> Self {
        Self {
            factory,
            containers: RwLock::new(HashMap::new()),
        }
    }

    pub fn container_name(container_id: i32) -> String {
        format!("{}{:05}{}", CONTAINER_PREFIX, container_id, CONTAINER_SUFFIX)
    }

    fn parse_container_name(name: &str) -> Option<i32> {
        name.strip_prefix(CONTAINER_PREFIX)?
            .strip_suffix(CONTAINER_SUFFIX)?
            .parse()
            .ok()
    }

    /// Open every container present in the factory's storage
    pub fn open_existing(&self) -> Result<usize> {
        let mut opened = 0;
        for name in self.factory.list()? {
            if let Some(id) = Self::parse_container_name(&name) {
                let container = self.factory.open(&name)?;
                self.containers.write().insert(id, container);
                opened += 1;
            }
        }
        info!("Opened {} existing containers", opened);
        Ok(opened)
    }

    pub fn create_container(&self, container_id: i32) -> Result<Arc<dyn StorageContainer>> {
        let container = self.factory.create(&Self::container_name(container_id))?;
        self.containers.write().insert(container_id, container.clone());
        Ok(container)
    }

    /// Open the container, creating it when missing. Used when replaying
    /// container creation during restart.
    pub fn ensure_container(&self, container_id: i32) -> Result<Arc<dyn StorageContainer>> {
        if let Some(container) = self.containers.read().get(&container_id) {
            return Ok(container.clone());
        }
        let name = Self::container_name(container_id);
        let container = if self.factory.exists(&name) {
            self.factory.open(&name)?
        } else {
            self.factory.create(&name)?
        };
        self.containers.write().insert(container_id, container.clone());
        Ok(container)
    }

    pub fn get(&self, container_id: i32) -> Result<Arc<dyn StorageContainer>> {
        self.containers
            .read()
            .get(&container_id)
            .cloned()
            .ok_or(ContainerError::NotOpen(container_id))
    }

    pub fn is_open(&self, container_id: i32) -> bool {
        self.containers.read().contains_key(&container_id)
    }

    /// Close and delete a container
    pub fn drop_container(&self, container_id: i32) -> Result<()> {
        self.containers.write().remove(&container_id);
        self.factory.delete(&Self::container_name(container_id))
    }

    pub fn container_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.containers.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn flush_all(&self) -> Result<()> {
        let containers: Vec<_> = self.containers.read().values().cloned().collect();
        for container in containers {
            container.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::disk::container::FileStorageContainerFactory;
    use tempfile::TempDir;

    #[test]
    fn test_reopen_existing_containers() -> Result<()> {
        let dir = TempDir::new()?;
        let factory = Arc::new(FileStorageContainerFactory::new(dir.path())?);
        {
            let storage = StorageManager::new(factory.clone());
            storage.create_container(1)?;
            storage.create_container(12)?;
            assert!(matches!(storage.create_container(1), Err(ContainerError::AlreadyExists(_))));
        }

        let storage = StorageManager::new(factory);
        assert_eq!(storage.open_existing()?, 2);
        assert_eq!(storage.container_ids(), vec![1, 12]);
        assert!(matches!(storage.get(3), Err(ContainerError::NotOpen(3))));

        storage.drop_container(12)?;
        assert!(!storage.is_open(12));
        Ok(())
    }
}
