//! Gift catalog.
//!
//! Loaded once from a JSON file before the session starts:
//!
//! ```json
//! {"31036": {"name": "Flower", "price": 100, "icon": "https://..."}}
//! ```

use crate::error::CoreError;
use crate::event::DomainEvent;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Static metadata for one gift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftInfo {
    pub name: String,
    /// Unit price.
    #[serde(default)]
    pub price: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// Gift metadata keyed by gift id.
#[derive(Debug, Clone, Default)]
pub struct GiftCatalog {
    gifts: HashMap<u64, GiftInfo>,
}

impl GiftCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a catalog from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| CoreError::CatalogRead {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Self::from_json(&content).map_err(|e| match e {
            CoreError::Json(source) => CoreError::CatalogParse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        tracing::info!("Loaded {} gifts from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    /// Parses a catalog from its JSON text.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let gifts: HashMap<u64, GiftInfo> = serde_json::from_str(json)?;
        Ok(Self { gifts })
    }

    pub fn insert(&mut self, gift_id: u64, info: GiftInfo) -> Option<GiftInfo> {
        self.gifts.insert(gift_id, info)
    }

    pub fn get(&self, gift_id: u64) -> Option<&GiftInfo> {
        self.gifts.get(&gift_id)
    }

    pub fn len(&self) -> usize {
        self.gifts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gifts.is_empty()
    }

    /// Fills catalog data into a gift event.
    ///
    /// The icon is always taken from the catalog; name and unit price only
    /// when the payload left them empty. Returns whether the event was a gift
    /// with a catalog entry. Other event kinds are left untouched.
    pub fn enrich(&self, event: &mut DomainEvent) -> bool {
        let DomainEvent::Gift(gift) = event else {
            return false;
        };
        let Some(info) = self.gifts.get(&gift.gift_id) else {
            tracing::debug!("Gift {} not in catalog", gift.gift_id);
            return false;
        };

        if gift.gift_name.is_empty() {
            gift.gift_name = info.name.clone();
        }
        if gift.price == 0 {
            gift.price = info.price;
        }
        if info.icon.is_some() {
            gift.icon = info.icon.clone();
        }
        true
    }
}
