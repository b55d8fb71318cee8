// SimpleDBM Object Registry
//
// Maps type codes to page formatters and key/location factories. Built once
// at startup and shared by reference; every code must be registered before
// restart recovery reads pages or index nodes that use it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use crate::common::types::Page;
use crate::index::btree::key::{
    IntKeyFactory, KeyFactory, LocationFactory, RowLocationFactory, StringKeyFactory,
};
use crate::storage::page::RAW_PAGE_TYPE;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Type code {code} already registered as {existing}")]
    Duplicate { code: u16, existing: String },
    #[error("No page type registered for code {0}")]
    UnknownPageType(u16),
    #[error("No key factory registered for code {0}")]
    UnknownKeyType(u16),
    #[error("No location factory registered for code {0}")]
    UnknownLocationType(u16),
}

pub type Result<T> = std::result::Result<T, RegistryError>;

/// Initializes the type specific part of a freshly typed page
pub type PageFormatter = fn(&mut Page);

#[derive(Clone, Copy)]
struct PageTypeEntry {
    name: &'static str,
    formatter: PageFormatter,
}

#[derive(Default)]
pub struct ObjectRegistry {
    page_types: RwLock<HashMap<u16, PageTypeEntry>>,
    key_factories: RwLock<HashMap<u16, Arc<dyn KeyFactory>>>,
    location_factories: RwLock<HashMap<u16, Arc<dyn LocationFactory>>>,
}

fn format_raw(_page: &mut Page) {}

impl ObjectRegistry {
    /// Registry holding the raw page type only
    pub fn new() -> Self {
        let registry = Self::default();
        registry.page_types.write().insert(
            RAW_PAGE_TYPE,
            PageTypeEntry {
                name: "raw",
                formatter: format_raw,
            },
        );
        registry
    }

    /// Registry with the built-in key and location factories. Page types of
    /// the space map and index modules are added by those modules.
    pub fn with_builtin_factories() -> Result<Self> {
        let registry = Self::new();
        registry.register_key_factory(Arc::new(StringKeyFactory))?;
        registry.register_key_factory(Arc::new(IntKeyFactory))?;
        registry.register_location_factory(Arc::new(RowLocationFactory))?;
        Ok(registry)
    }

    pub fn register_page_type(&self, code: u16, name: &'static str, formatter: PageFormatter) -> Result<()> {
        let mut page_types = self.page_types.write();
        if let Some(existing) = page_types.get(&code) {
            return Err(RegistryError::Duplicate {
                code,
                existing: existing.name.to_string(),
            });
        }
        page_types.insert(code, PageTypeEntry { name, formatter });
        Ok(())
    }

    pub fn page_formatter(&self, code: u16) -> Result<PageFormatter> {
        self.page_types
            .read()
            .get(&code)
            .map(|entry| entry.formatter)
            .ok_or(RegistryError::UnknownPageType(code))
    }

    pub fn page_type_name(&self, code: u16) -> Option<&'static str> {
        self.page_types.read().get(&code).map(|entry| entry.name)
    }

    pub fn is_page_type_registered(&self, code: u16) -> bool {
        self.page_types.read().contains_key(&code)
    }

    pub fn register_key_factory(&self, factory: Arc<dyn KeyFactory>) -> Result<()> {
        let mut factories = self.key_factories.write();
        let code = factory.type_code();
        if let Some(existing) = factories.get(&code) {
            return Err(RegistryError::Duplicate {
                code,
                existing: existing.name().to_string(),
            });
        }
        factories.insert(code, factory);
        Ok(())
    }

    pub fn key_factory(&self, code: u16) -> Result<Arc<dyn KeyFactory>> {
        self.key_factories
            .read()
            .get(&code)
            .cloned()
            .ok_or(RegistryError::UnknownKeyType(code))
    }

    pub fn register_location_factory(&self, factory: Arc<dyn LocationFactory>) -> Result<()> {
        let mut factories = self.location_factories.write();
        let code = factory.type_code();
        if let Some(existing) = factories.get(&code) {
            return Err(RegistryError::Duplicate {
                code,
                existing: existing.name().to_string(),
            });
        }
        factories.insert(code, factory);
        Ok(())
    }

    pub fn location_factory(&self, code: u16) -> Result<Arc<dyn LocationFactory>> {
        self.location_factories
            .read()
            .get(&code)
            .cloned()
            .ok_or(RegistryError::UnknownLocationType(code))
    }
}
