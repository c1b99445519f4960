//! MongoDB-backed catalog store.

use async_trait::async_trait;
use chrono::Utc;
use futures_util::TryStreamExt;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, from_document, to_document, Bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{
    ClientOptions, FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument,
};
use mongodb::{Client, Collection, Database, IndexModel};
use tracing::{error, info};

use super::{
    CatalogError, CatalogStore, Category, CategoryStore, MediaFilter, MediaRecord, StatusFilter,
};
use crate::config::CatalogSettings;

const MEDIA_COLLECTION: &str = "media";
const CATEGORY_COLLECTION: &str = "categories";
const DUPLICATE_KEY_CODE: i32 = 11000;

/// Catalog persisted in MongoDB
pub struct MongoCatalog {
    database: Database,
    media: Collection<Document>,
    categories: Collection<Document>,
}

impl MongoCatalog {
    /// Connect and make sure indexes exist
    ///
    /// # Errors
    ///
    /// Returns an error if the URI is missing or invalid, or index creation fails.
    pub async fn new(settings: &CatalogSettings) -> Result<Self, CatalogError> {
        let uri = settings
            .mongo_uri
            .as_ref()
            .ok_or_else(|| CatalogError::Config("MONGO_URI is missing".into()))?;

        let options = ClientOptions::parse(uri).await.map_err(database_error)?;
        let client = Client::with_options(options).map_err(database_error)?;
        let database = client.database(&settings.mongo_database);
        let media = database.collection::<Document>(MEDIA_COLLECTION);
        let categories = database.collection::<Document>(CATEGORY_COLLECTION);

        ensure_indexes(&media, &categories).await?;

        Ok(Self {
            database,
            media,
            categories,
        })
    }

    async fn find_records(
        &self,
        filter: Document,
        options: Option<FindOptions>,
    ) -> Result<Vec<MediaRecord>, CatalogError> {
        let cursor = self
            .media
            .find(filter, options)
            .await
            .map_err(database_error)?;
        let documents: Vec<Document> = cursor.try_collect().await.map_err(database_error)?;
        documents.into_iter().map(record_from_document).collect()
    }
}

async fn ensure_indexes(
    media: &Collection<Document>,
    categories: &Collection<Document>,
) -> Result<(), CatalogError> {
    let category_index = IndexModel::builder()
        .keys(doc! {"category": 1})
        .options(
            IndexOptions::builder()
                .unique(true)
                .name(Some("uid_category".to_string()))
                .build(),
        )
        .build();
    categories
        .create_index(category_index, None::<mongodb::options::CreateIndexOptions>)
        .await
        .map_err(database_error)?;

    let listing_index = IndexModel::builder()
        .keys(doc! {"status": 1, "mediaType": 1})
        .options(
            IndexOptions::builder()
                .name(Some("idx_status_media_type".to_string()))
                .build(),
        )
        .build();
    media
        .create_index(listing_index, None::<mongodb::options::CreateIndexOptions>)
        .await
        .map_err(database_error)?;

    Ok(())
}

fn database_error(e: mongodb::error::Error) -> CatalogError {
    CatalogError::Database(e.to_string())
}

fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
    match e.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(we)) => we.code == DUPLICATE_KEY_CODE,
        ErrorKind::Command(ce) => ce.code == DUPLICATE_KEY_CODE,
        _ => false,
    }
}

/// Ids that do not parse as object ids cannot match any stored record.
fn object_id(id: &str) -> Option<ObjectId> {
    ObjectId::parse_str(id).ok()
}

fn object_ids(ids: &[String]) -> Vec<ObjectId> {
    ids.iter().map(String::as_str).filter_map(object_id).collect()
}

/// Serialize a record, storing its id as an `ObjectId`.
fn record_to_document(record: &MediaRecord, id: ObjectId) -> Result<Document, CatalogError> {
    let mut document =
        to_document(record).map_err(|e| CatalogError::Database(format!("encode record: {e}")))?;
    document.insert("_id", id);
    Ok(document)
}

fn record_from_document(document: Document) -> Result<MediaRecord, CatalogError> {
    from_document(hex_id(document)?)
        .map_err(|e| CatalogError::Database(format!("decode record: {e}")))
}

fn category_from_document(document: Document) -> Result<Category, CatalogError> {
    from_document(hex_id(document)?)
        .map_err(|e| CatalogError::Database(format!("decode category: {e}")))
}

fn hex_id(mut document: Document) -> Result<Document, CatalogError> {
    let id = document
        .get_object_id("_id")
        .map_err(|e| CatalogError::Database(format!("document id: {e}")))?;
    document.insert("_id", id.to_hex());
    Ok(document)
}

fn filter_document(filter: &MediaFilter) -> Document {
    let mut document = doc! {};
    match filter.status {
        StatusFilter::Any => {}
        StatusFilter::Is(status) => {
            document.insert("status", status.as_str());
        }
        StatusFilter::Not(status) => {
            document.insert("status", doc! {"$ne": status.as_str()});
        }
    }
    if let Some(media_type) = filter.media_type {
        document.insert("mediaType", media_type.as_str());
    }
    if let Some(id) = filter.exclude_id.as_deref().and_then(object_id) {
        document.insert("_id", doc! {"$ne": id});
    }
    document
}

#[async_trait]
impl CatalogStore for MongoCatalog {
    async fn insert(&self, mut record: MediaRecord) -> Result<MediaRecord, CatalogError> {
        let id = ObjectId::new();
        record.id = id.to_hex();
        let document = record_to_document(&record, id)?;
        self.media
            .insert_one(document, None)
            .await
            .map_err(database_error)?;
        Ok(record)
    }

    async fn get(&self, id: &str) -> Result<Option<MediaRecord>, CatalogError> {
        let Some(oid) = object_id(id) else {
            return Ok(None);
        };
        self.media
            .find_one(doc! {"_id": oid}, None)
            .await
            .map_err(database_error)?
            .map(record_from_document)
            .transpose()
    }

    async fn get_many(&self, ids: &[String]) -> Result<Vec<MediaRecord>, CatalogError> {
        let oids = object_ids(ids);
        if oids.is_empty() {
            return Ok(Vec::new());
        }
        self.find_records(doc! {"_id": {"$in": oids}}, None).await
    }

    async fn list(&self, filter: &MediaFilter) -> Result<Vec<MediaRecord>, CatalogError> {
        let options = FindOptions::builder()
            .limit(filter.limit)
            .sort(doc! {"_id": 1})
            .build();
        self.find_records(filter_document(filter), Some(options)).await
    }

    async fn replace(&self, record: &MediaRecord) -> Result<bool, CatalogError> {
        let Some(oid) = object_id(&record.id) else {
            return Ok(false);
        };
        let document = record_to_document(record, oid)?;
        let result = self
            .media
            .replace_one(doc! {"_id": oid}, document, None)
            .await
            .map_err(database_error)?;
        Ok(result.matched_count > 0)
    }

    async fn delete(&self, id: &str) -> Result<bool, CatalogError> {
        let Some(oid) = object_id(id) else {
            return Ok(false);
        };
        let result = self
            .media
            .delete_one(doc! {"_id": oid}, None)
            .await
            .map_err(database_error)?;
        Ok(result.deleted_count > 0)
    }

    async fn delete_many(&self, ids: &[String]) -> Result<u64, CatalogError> {
        let oids = object_ids(ids);
        if oids.is_empty() {
            return Ok(0);
        }
        let result = self
            .media
            .delete_many(doc! {"_id": {"$in": oids}}, None)
            .await
            .map_err(database_error)?;
        Ok(result.deleted_count)
    }

    async fn check_connection(&self) -> Result<(), String> {
        match self.database.run_command(doc! {"ping": 1}, None).await {
            Ok(_) => {
                info!("Successfully connected to MongoDB.");
                Ok(())
            }
            Err(e) => {
                let err_msg = format!("MongoDB connectivity test failed: {e}");
                error!("{}", err_msg);
                Err(err_msg)
            }
        }
    }
}

#[async_trait]
impl CategoryStore for MongoCatalog {
    async fn create_category(&self, name: &str) -> Result<Category, CatalogError> {
        let now = Utc::now();
        let id = ObjectId::new();
        let category = Category {
            id: id.to_hex(),
            category: name.to_string(),
            created_at: now,
            updated_at: now,
        };
        let mut document = to_document(&category)
            .map_err(|e| CatalogError::Database(format!("encode category: {e}")))?;
        document.insert("_id", id);

        match self.categories.insert_one(document, None).await {
            Ok(_) => Ok(category),
            Err(e) if is_duplicate_key(&e) => {
                Err(CatalogError::Duplicate(format!("category {name:?}")))
            }
            Err(e) => Err(database_error(e)),
        }
    }

    async fn list_categories(&self) -> Result<Vec<String>, CatalogError> {
        let options = FindOptions::builder()
            .projection(doc! {"category": 1, "_id": 0})
            .build();
        let cursor = self
            .categories
            .find(None, options)
            .await
            .map_err(database_error)?;
        let documents: Vec<Document> = cursor.try_collect().await.map_err(database_error)?;
        Ok(documents
            .into_iter()
            .filter_map(|d| match d.get("category") {
                Some(Bson::String(name)) => Some(name.clone()),
                _ => None,
            })
            .collect())
    }

    async fn rename_category(&self, old: &str, new: &str) -> Result<Option<Category>, CatalogError> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        let update = doc! {"$set": {"category": new, "updatedAt": Utc::now().to_rfc3339()}};

        match self
            .categories
            .find_one_and_update(doc! {"category": old}, update, options)
            .await
        {
            Ok(document) => document.map(category_from_document).transpose(),
            Err(e) if is_duplicate_key(&e) => {
                Err(CatalogError::Duplicate(format!("category {new:?}")))
            }
            Err(e) => Err(database_error(e)),
        }
    }

    async fn delete_category(&self, name: &str) -> Result<bool, CatalogError> {
        let result = self
            .categories
            .delete_one(doc! {"category": name}, None)
            .await
            .map_err(database_error)?;
        Ok(result.deleted_count > 0)
    }
}
