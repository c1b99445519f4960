//! In-process catalog store.

use async_trait::async_trait;
use chrono::Utc;
use mongodb::bson::oid::ObjectId;
use tokio::sync::RwLock;

use super::{CatalogError, CatalogStore, Category, CategoryStore, MediaFilter, MediaRecord};

/// Catalog kept in memory, in insertion order.
///
/// Used when no MongoDB URI is configured and in tests. Ids have the same
/// shape as MongoDB object ids.
#[derive(Default)]
pub struct MemoryCatalog {
    records: RwLock<Vec<MediaRecord>>,
    categories: RwLock<Vec<Category>>,
}

impl MemoryCatalog {
    /// Create an empty catalog
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn insert(&self, mut record: MediaRecord) -> Result<MediaRecord, CatalogError> {
        record.id = ObjectId::new().to_hex();
        self.records.write().await.push(record.clone());
        Ok(record)
    }

    async fn get(&self, id: &str) -> Result<Option<MediaRecord>, CatalogError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn get_many(&self, ids: &[String]) -> Result<Vec<MediaRecord>, CatalogError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| ids.contains(&r.id))
            .cloned()
            .collect())
    }

    async fn list(&self, filter: &MediaFilter) -> Result<Vec<MediaRecord>, CatalogError> {
        let limit = filter
            .limit
            .and_then(|l| usize::try_from(l).ok())
            .unwrap_or(usize::MAX);
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| filter.matches(r))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn replace(&self, record: &MediaRecord) -> Result<bool, CatalogError> {
        let mut records = self.records.write().await;
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(slot) => {
                *slot = record.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool, CatalogError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.id != id);
        Ok(records.len() != before)
    }

    async fn delete_many(&self, ids: &[String]) -> Result<u64, CatalogError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| !ids.contains(&r.id));
        Ok((before - records.len()) as u64)
    }

    async fn check_connection(&self) -> Result<(), String> {
        Ok(())
    }
}

#[async_trait]
impl CategoryStore for MemoryCatalog {
    async fn create_category(&self, name: &str) -> Result<Category, CatalogError> {
        let mut categories = self.categories.write().await;
        if categories.iter().any(|c| c.category == name) {
            return Err(CatalogError::Duplicate(format!("category {name:?}")));
        }
        let now = Utc::now();
        let category = Category {
            id: ObjectId::new().to_hex(),
            category: name.to_string(),
            created_at: now,
            updated_at: now,
        };
        categories.push(category.clone());
        Ok(category)
    }

    async fn list_categories(&self) -> Result<Vec<String>, CatalogError> {
        Ok(self
            .categories
            .read()
            .await
            .iter()
            .map(|c| c.category.clone())
            .collect())
    }

    async fn rename_category(&self, old: &str, new: &str) -> Result<Option<Category>, CatalogError> {
        let mut categories = self.categories.write().await;
        if old != new && categories.iter().any(|c| c.category == new) {
            return Err(CatalogError::Duplicate(format!("category {new:?}")));
        }
        Ok(categories
            .iter_mut()
            .find(|c| c.category == old)
            .map(|c| {
                c.category = new.to_string();
                c.updated_at = Utc::now();
                c.clone()
            }))
    }

    async fn delete_category(&self, name: &str) -> Result<bool, CatalogError> {
        let mut categories = self.categories.write().await;
        let before = categories.len();
        categories.retain(|c| c.category != name);
        Ok(categories.len() != before)
    }
}
