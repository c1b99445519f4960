//! Catalog workflows.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use futures_util::future::join_all;
use tracing::{info, instrument, warn};

use super::{
    CatalogError, CatalogStore, Category, CategoryStore, MediaBulkUpdate, MediaDraft, MediaFilter,
    MediaPatch, MediaRecord, MediaType, ModerationStatus, PendingSummary, StatusFilter,
};
use crate::config::RELATED_ITEMS_LIMIT;
use crate::migrator::{is_animated_archive, AssetMigrator, AssetSource};
use crate::resolver::{EntityResolver, StickerSetSummary};

/// Record and category workflows on top of the stores.
#[derive(Clone)]
pub struct CatalogService {
    records: Arc<dyn CatalogStore>,
    categories: Arc<dyn CategoryStore>,
    migrator: AssetMigrator,
    resolver: EntityResolver,
    author: String,
}

impl CatalogService {
    /// Create a service
    #[must_use]
    pub fn new(
        records: Arc<dyn CatalogStore>,
        categories: Arc<dyn CategoryStore>,
        migrator: AssetMigrator,
        resolver: EntityResolver,
        author: impl Into<String>,
    ) -> Self {
        Self {
            records,
            categories,
            migrator,
            resolver,
            author: author.into(),
        }
    }

    /// Persist a new record in `Pending` state.
    ///
    /// The avatar is migrated first and its failure aborts the submission;
    /// sticker migrations are best effort.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Validation`] for a missing name or unknown type,
    /// [`CatalogError::Migration`] if the avatar cannot be stored, or a store error.
    #[instrument(skip_all, fields(name = %draft.name, media_type = %draft.media_type))]
    pub async fn create(&self, draft: MediaDraft) -> Result<MediaRecord, CatalogError> {
        let name = draft.name.trim();
        if name.is_empty() {
            return Err(CatalogError::Validation("name is required".into()));
        }
        let media_type = MediaType::normalize(&draft.media_type)?;

        let image_url = match draft.image_url.as_deref().map(str::trim) {
            Some(source) if !source.is_empty() => {
                self.check_image_source(source)?;
                Some(self.migrator.migrate_detected(source).await?.url)
            }
            _ => None,
        };

        let (sticker_images, animated_sticker) = match &draft.sticker_set {
            Some(set) => (
                self.migrate_stickers(set).await,
                set.stickers.iter().any(|s| s.is_animated),
            ),
            None => (Vec::new(), false),
        };

        let now = Utc::now();
        let record = MediaRecord {
            id: String::new(),
            url: draft.url,
            image_url,
            name: name.to_string(),
            member_count: draft.member_count,
            date: now.to_rfc3339(),
            author: self.author.clone(),
            category: draft.category,
            language: draft.language,
            featured: draft.featured,
            tags: draft.tags,
            description: draft.description,
            nsfw: draft.nsfw,
            status: ModerationStatus::Pending,
            media_type,
            sticker_images,
            animated_sticker,
            created_at: now,
            updated_at: now,
        };

        let record = self.records.insert(record).await?;
        info!(
            id = %record.id,
            stickers = record.sticker_images.len(),
            "Media record created"
        );
        Ok(record)
    }

    /// Only inline images and this bot's own file downloads are fetched.
    fn check_image_source(&self, source: &str) -> Result<(), CatalogError> {
        if source.starts_with("data:") || self.resolver.is_file_url(source) {
            Ok(())
        } else {
            warn!("Rejected avatar source outside the Telegram file API");
            Err(CatalogError::Validation(
                "imageUrl must be a Telegram file URL or a data URI".into(),
            ))
        }
    }

    /// Resolve every sticker's file URL and migrate them; failures are dropped.
    async fn migrate_stickers(&self, set: &StickerSetSummary) -> Vec<String> {
        let lookups = join_all(
            set.stickers
                .iter()
                .map(|sticker| self.resolver.file_url(&sticker.file_id)),
        )
        .await;

        let sources: Vec<AssetSource> = set
            .stickers
            .iter()
            .zip(lookups)
            .filter_map(|(sticker, lookup)| {
                let url = lookup.into_option("sticker file", &set.name)?;
                let is_animated_archive = sticker.is_animated || is_animated_archive(&url);
                Some(AssetSource {
                    url,
                    is_animated_archive,
                })
            })
            .collect();

        self.migrator
            .migrate_all(&sources)
            .await
            .into_iter()
            .map(|asset| asset.url)
            .collect()
    }

    /// Get a record.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if the record does not exist.
    pub async fn get(&self, id: &str) -> Result<MediaRecord, CatalogError> {
        self.records
            .get(id)
            .await?
            .ok_or_else(|| CatalogError::NotFound("Media not found".into()))
    }

    /// Moderation queue: everything not yet approved, optionally of one type.
    ///
    /// An empty type or the literal `undefined` means "all types".
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Validation`] for an unknown type, or a store error.
    pub async fn list_pending(
        &self,
        media_type: Option<&str>,
    ) -> Result<Vec<PendingSummary>, CatalogError> {
        let media_type = match media_type.map(str::trim) {
            Some(raw) if !raw.is_empty() && raw != "undefined" => Some(MediaType::normalize(raw)?),
            _ => None,
        };
        let filter = MediaFilter {
            status: StatusFilter::Not(ModerationStatus::Approved),
            media_type,
            ..MediaFilter::default()
        };
        Ok(self
            .records
            .list(&filter)
            .await?
            .into_iter()
            .map(PendingSummary::from)
            .collect())
    }

    /// Public listing.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub async fn list_approved(&self) -> Result<Vec<MediaRecord>, CatalogError> {
        self.records
            .list(&MediaFilter {
                status: StatusFilter::Is(ModerationStatus::Approved),
                ..MediaFilter::default()
            })
            .await
    }

    /// Apply a whitelisted patch.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`], a validation or transition error,
    /// or a store error.
    #[instrument(skip(self, patch))]
    pub async fn update(&self, id: &str, patch: &MediaPatch) -> Result<MediaRecord, CatalogError> {
        let mut record = self.get(id).await?;
        if patch.apply(&mut record, Utc::now())? {
            if !self.records.replace(&record).await? {
                return Err(CatalogError::NotFound("Media not found".into()));
            }
            info!(status = %record.status, "Media record updated");
        }
        Ok(record)
    }

    /// Apply many patches. Every patch is validated before anything is written.
    ///
    /// Ids that do not exist are skipped. Returns the number of modified records.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Validation`] for an empty batch, a validation or
    /// transition error if any patch is invalid, or [`CatalogError::NotFound`]
    /// when nothing was modified.
    #[instrument(skip_all, fields(count = updates.len()))]
    pub async fn update_many(&self, updates: &[MediaBulkUpdate]) -> Result<u64, CatalogError> {
        if updates.is_empty() {
            return Err(CatalogError::Validation(
                "An array of updates is required".into(),
            ));
        }

        let ids: Vec<String> = updates.iter().map(|u| u.id.clone()).collect();
        let mut working: HashMap<String, MediaRecord> = self
            .records
            .get_many(&ids)
            .await?
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();

        let now = Utc::now();
        let mut changed = HashSet::new();
        for update in updates {
            match working.get_mut(&update.id) {
                Some(record) => {
                    if update.patch.apply(record, now)? {
                        changed.insert(update.id.clone());
                    }
                }
                None => warn!(id = %update.id, "Skipping update of unknown media"),
            }
        }

        let mut modified = 0u64;
        for id in &changed {
            if let Some(record) = working.get(id) {
                if self.records.replace(record).await? {
                    modified += 1;
                }
            }
        }

        if modified == 0 {
            return Err(CatalogError::NotFound("No media items were updated".into()));
        }
        info!(modified, "Media records updated");
        Ok(modified)
    }

    /// Delete a record, then its stored assets (best effort).
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] or a store error.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<(), CatalogError> {
        let record = self.get(id).await?;
        if !self.records.delete(id).await? {
            return Err(CatalogError::NotFound("Media not found".into()));
        }
        self.migrator.delete_assets(&record.asset_urls()).await;
        info!("Media record deleted");
        Ok(())
    }

    /// Delete many records and their stored assets (best effort).
    ///
    /// Returns the number of deleted records.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Validation`] for an empty id list,
    /// [`CatalogError::NotFound`] when no id matches, or a store error.
    #[instrument(skip_all, fields(count = ids.len()))]
    pub async fn delete_many(&self, ids: &[String]) -> Result<u64, CatalogError> {
        if ids.is_empty() {
            return Err(CatalogError::Validation("An array of IDs is required".into()));
        }
        let records = self.records.get_many(ids).await?;
        if records.is_empty() {
            return Err(CatalogError::NotFound(
                "No media found for the given IDs".into(),
            ));
        }

        let deleted = self.records.delete_many(ids).await?;
        let urls: Vec<String> = records.iter().flat_map(MediaRecord::asset_urls).collect();
        self.migrator.delete_assets(&urls).await;
        info!(deleted, assets = urls.len(), "Media records deleted");
        Ok(deleted)
    }

    /// Records of the same type as the one being viewed, excluding it.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Validation`] if the excluded record is missing
    /// or the type is unknown, or a store error.
    pub async fn related(
        &self,
        media_type: &str,
        exclude_id: &str,
    ) -> Result<Vec<MediaRecord>, CatalogError> {
        if exclude_id.trim().is_empty() {
            return Err(CatalogError::Validation(
                "Please provide the media id of the current page.".into(),
            ));
        }
        let media_type = MediaType::normalize(media_type)?;
        if self.records.get(exclude_id).await?.is_none() {
            return Err(CatalogError::Validation(
                "Excluded item does not exist.".into(),
            ));
        }

        self.records
            .list(&MediaFilter {
                media_type: Some(media_type),
                exclude_id: Some(exclude_id.to_string()),
                limit: Some(RELATED_ITEMS_LIMIT),
                ..MediaFilter::default()
            })
            .await
    }

    /// Create a category.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Validation`] for an empty name or
    /// [`CatalogError::Duplicate`] if it exists.
    pub async fn create_category(&self, name: &str) -> Result<Category, CatalogError> {
        let name = non_empty(name, "Category must be a non-empty string")?;
        let category = self.categories.create_category(name).await?;
        info!(category = %category.category, "Category created");
        Ok(category)
    }

    /// All category names.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub async fn list_categories(&self) -> Result<Vec<String>, CatalogError> {
        self.categories.list_categories().await
    }

    /// Rename a category.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Validation`] for empty names,
    /// [`CatalogError::NotFound`] or [`CatalogError::Duplicate`].
    pub async fn rename_category(&self, old: &str, new: &str) -> Result<Category, CatalogError> {
        const MESSAGE: &str = "Both oldCategory and newCategory must be non-empty strings";
        let old = non_empty(old, MESSAGE)?;
        let new = non_empty(new, MESSAGE)?;
        self.categories
            .rename_category(old, new)
            .await?
            .ok_or_else(|| CatalogError::NotFound("Category not found".into()))
    }

    /// Delete a category.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Validation`] for an empty name or
    /// [`CatalogError::NotFound`].
    pub async fn delete_category(&self, name: &str) -> Result<(), CatalogError> {
        let name = non_empty(name, "Category must be a non-empty string")?;
        if self.categories.delete_category(name).await? {
            Ok(())
        } else {
            Err(CatalogError::NotFound("Category not found".into()))
        }
    }

    /// Check connection to the record store
    pub async fn check_connection(&self) -> Result<(), String> {
        self.records.check_connection().await
    }
}

fn non_empty<'a>(value: &'a str, message: &str) -> Result<&'a str, CatalogError> {
    let value = value.trim();
    if value.is_empty() {
        Err(CatalogError::Validation(message.to_string()))
    } else {
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{MemoryCatalog, MockCatalogStore};
    use crate::cdn::{CdnError, MockCdnClient};
    use crate::resolver::StickerRef;
    use crate::telegram::MockTelegramApi;
    use crate::testing::{mock_cdn_echo, mock_telegram_files};

    fn service_with(cdn: MockCdnClient, api: MockTelegramApi) -> (CatalogService, Arc<MemoryCatalog>) {
        let store = Arc::new(MemoryCatalog::new());
        let service = CatalogService::new(
            store.clone(),
            store.clone(),
            AssetMigrator::new(Arc::new(cdn), "telegram_images"),
            EntityResolver::new(Arc::new(api)),
            "catalog@example.com",
        );
        (service, store)
    }

    fn draft(name: &str, media_type: &str) -> MediaDraft {
        MediaDraft {
            url: format!("https://t.me/{name}"),
            name: name.to_string(),
            member_count: 42,
            image_url: Some(format!("https://api.telegram.org/file/botT/photos/{name}.jpg")),
            media_type: media_type.to_string(),
            ..MediaDraft::default()
        }
    }

    #[tokio::test]
    async fn test_create_migrates_avatar_and_normalizes_type() {
        let (service, _) = service_with(mock_cdn_echo(), mock_telegram_files());
        let record = service
            .create(draft("chatters", "supergroup"))
            .await
            .expect("created");

        assert_eq!(record.media_type, MediaType::Group);
        assert_eq!(record.status, ModerationStatus::Pending);
        assert_eq!(record.author, "catalog@example.com");
        assert_eq!(
            record.image_url.as_deref(),
            Some("https://cdn.example.com/image/upload/telegram_images/chatters.jpg")
        );
        assert!(!record.image_url.unwrap_or_default().contains("botT"));
    }

    #[tokio::test]
    async fn test_create_migrates_stickers_and_drops_failures() {
        let (service, _) = service_with(mock_cdn_echo(), mock_telegram_files());
        let mut submission = draft("funpack", "sticker");
        submission.sticker_set = Some(StickerSetSummary {
            name: "funpack".to_string(),
            title: "Fun Pack".to_string(),
            stickers: ["s1", "missing", "s3"]
                .into_iter()
                .map(|id| StickerRef {
                    file_id: id.to_string(),
                    is_animated: false,
                })
                .collect(),
        });

        let record = service.create(submission).await.expect("created");
        assert_eq!(
            record.sticker_images,
            [
                "https://cdn.example.com/image/upload/telegram_images/s1.webp",
                "https://cdn.example.com/image/upload/telegram_images/s3.webp"
            ]
        );
        assert!(!record.animated_sticker);
    }

    #[tokio::test]
    async fn test_create_fails_when_avatar_cannot_be_stored() {
        let mut cdn = MockCdnClient::new();
        cdn.expect_upload()
            .returning(|_, _| Err(CdnError::Upload("quota exceeded".to_string())));
        let (service, store) = service_with(cdn, mock_telegram_files());

        let err = service
            .create(draft("broken", "channel"))
            .await
            .expect_err("avatar failure aborts");
        assert!(matches!(err, CatalogError::Migration(_)));
        assert!(store.list(&MediaFilter::default()).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_type() {
        let (service, _) = service_with(MockCdnClient::new(), MockTelegramApi::new());
        let mut submission = draft("someone", "private");
        submission.image_url = None;
        assert!(matches!(
            service.create(submission).await,
            Err(CatalogError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_create_only_fetches_telegram_or_inline_avatars() {
        // No upload expectation: any fetch of a foreign URL panics the mock
        let (service, store) = service_with(MockCdnClient::new(), mock_telegram_files());
        for source in [
            "http://169.254.169.254/latest/meta-data/iam/security-credentials/",
            "https://api.telegram.org.evil.example/file/botT/photos/a.jpg",
            "https://api.telegram.org/file/botOTHER/photos/a.jpg",
            "file:///etc/passwd",
        ] {
            let mut submission = draft("intruder", "channel");
            submission.image_url = Some(source.to_string());
            assert!(
                matches!(
                    service.create(submission).await,
                    Err(CatalogError::Validation(_))
                ),
                "expected {source:?} to be rejected"
            );
        }
        assert!(store.list(&MediaFilter::default()).await.expect("list").is_empty());

        let (service, _) = service_with(mock_cdn_echo(), mock_telegram_files());
        let mut submission = draft("inline", "channel");
        submission.image_url = Some("data:image/png;base64,iVBORw0KGgo=".to_string());
        let record = service.create(submission).await.expect("data URI accepted");
        assert!(record.image_url.is_some());
    }

    #[tokio::test]
    async fn test_moderation_flow() {
        let (service, _) = service_with(mock_cdn_echo(), mock_telegram_files());
        let a = service.create(draft("alpha", "channel")).await.expect("a");
        let b = service.create(draft("beta", "channel")).await.expect("b");

        let approve = MediaPatch {
            status: Some(ModerationStatus::Approved),
            ..MediaPatch::default()
        };
        service.update(&a.id, &approve).await.expect("approve");

        let pending = service.list_pending(None).await.expect("pending");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, b.id);
        assert_eq!(service.list_approved().await.expect("approved").len(), 1);

        let back = MediaPatch {
            status: Some(ModerationStatus::Pending),
            ..MediaPatch::default()
        };
        assert!(matches!(
            service.update(&a.id, &back).await,
            Err(CatalogError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_many_validates_before_writing() {
        let (service, _) = service_with(mock_cdn_echo(), mock_telegram_files());
        let a = service.create(draft("alpha", "bot")).await.expect("a");
        let b = service.create(draft("beta", "bot")).await.expect("b");
        service
            .update(
                &b.id,
                &MediaPatch {
                    status: Some(ModerationStatus::Rejected),
                    ..MediaPatch::default()
                },
            )
            .await
            .expect("reject b");

        let updates = vec![
            MediaBulkUpdate {
                id: a.id.clone(),
                patch: MediaPatch {
                    featured: Some(true),
                    ..MediaPatch::default()
                },
            },
            MediaBulkUpdate {
                id: b.id.clone(),
                patch: MediaPatch {
                    status: Some(ModerationStatus::Approved),
                    ..MediaPatch::default()
                },
            },
        ];
        assert!(service.update_many(&updates).await.is_err());
        assert!(!service.get(&a.id).await.expect("a").featured);

        let modified = service.update_many(&updates[..1]).await.expect("valid batch");
        assert_eq!(modified, 1);
        assert!(service.get(&a.id).await.expect("a").featured);

        // Same values again: nothing modified
        assert!(matches!(
            service.update_many(&updates[..1]).await,
            Err(CatalogError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_removes_record_even_if_assets_fail() {
        let mut cdn = mock_cdn_echo();
        cdn.expect_batch_destroy()
            .returning(|_, _| Err(CdnError::Delete("unavailable".to_string())));
        let (service, _) = service_with(cdn, mock_telegram_files());
        let record = service.create(draft("alpha", "channel")).await.expect("created");

        service.delete(&record.id).await.expect("deleted");
        assert!(matches!(
            service.get(&record.id).await,
            Err(CatalogError::NotFound(_))
        ));
        assert!(matches!(
            service.delete(&record.id).await,
            Err(CatalogError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_many() {
        let mut cdn = mock_cdn_echo();
        cdn.expect_batch_destroy()
            .withf(|ids, _| ids.len() == 2)
            .times(1)
            .returning(|_, _| Ok(()));
        let (service, _) = service_with(cdn, mock_telegram_files());
        let a = service.create(draft("alpha", "bot")).await.expect("a");
        let b = service.create(draft("beta", "bot")).await.expect("b");

        assert!(matches!(
            service.delete_many(&[]).await,
            Err(CatalogError::Validation(_))
        ));
        assert!(matches!(
            service.delete_many(&["65f0c0ffee0000000000beef".to_string()]).await,
            Err(CatalogError::NotFound(_))
        ));
        let deleted = service
            .delete_many(&[a.id, b.id, "unknown".to_string()])
            .await
            .expect("deleted");
        assert_eq!(deleted, 2);
    }

    #[tokio::test]
    async fn test_related_excludes_current_and_caps() {
        let (service, _) = service_with(mock_cdn_echo(), mock_telegram_files());
        let mut ids = Vec::new();
        for i in 0..10 {
            ids.push(
                service
                    .create(draft(&format!("c{i}"), "channel"))
                    .await
                    .expect("created")
                    .id,
            );
        }
        service.create(draft("g", "group")).await.expect("created");

        let related = service.related("channel", &ids[0]).await.expect("related");
        assert_eq!(related.len(), 8);
        assert!(related.iter().all(|r| r.id != ids[0]));
        assert!(related.iter().all(|r| r.media_type == MediaType::Channel));

        assert!(matches!(
            service.related("channel", "65f0c0ffee0000000000beef").await,
            Err(CatalogError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_category_validation() {
        let (service, _) = service_with(MockCdnClient::new(), MockTelegramApi::new());
        assert!(matches!(
            service.create_category("  ").await,
            Err(CatalogError::Validation(_))
        ));
        service.create_category("News").await.expect("created");
        assert!(matches!(
            service.rename_category("Missing", "Other").await,
            Err(CatalogError::NotFound(_))
        ));
        assert!(matches!(
            service.delete_category("Missing").await,
            Err(CatalogError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_store_failures_propagate() {
        let mut records = MockCatalogStore::new();
        records
            .expect_list()
            .returning(|_| Err(CatalogError::Database("connection refused".to_string())));
        let service = CatalogService::new(
            Arc::new(records),
            Arc::new(MemoryCatalog::new()),
            AssetMigrator::new(Arc::new(MockCdnClient::new()), "f"),
            EntityResolver::new(Arc::new(MockTelegramApi::new())),
            "a",
        );
        assert!(matches!(
            service.list_approved().await,
            Err(CatalogError::Database(_))
        ));
    }
}
