//! Asset migration
//!
//! Moves files behind transient, token-authenticated Telegram URLs into
//! permanent CDN storage, and deletes them again when a record goes away.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::cdn::{
    encode_data_uri, public_id_from_url, CdnClient, CdnError, ResourceType, UploadOptions,
    TGS_MIME,
};
use crate::config::{get_cdn_http_timeout_secs, CatalogSettings};
use crate::utils::{retry_transport_operation, strip_query};

/// Errors of a single asset migration
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Source bytes could not be fetched
    #[error("Asset download failed: {0}")]
    Download(String),
    /// CDN rejected the upload
    #[error("Asset upload failed: {0}")]
    Upload(#[from] CdnError),
}

/// A permanently stored asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigratedAsset {
    /// Permanent public URL
    pub url: String,
    /// Whether the asset is an animated `.tgs` archive
    pub is_animated: bool,
}

/// One input of a batch migration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetSource {
    /// URL or data URI
    pub url: String,
    /// Whether the source is an animated `.tgs` archive
    pub is_animated_archive: bool,
}

impl AssetSource {
    /// Build a source, detecting animated archives from the URL
    #[must_use]
    pub fn detect(url: impl Into<String>) -> Self {
        let url = url.into();
        let is_animated_archive = is_animated_archive(&url);
        Self {
            url,
            is_animated_archive,
        }
    }
}

/// Whether a URL points at an animated `.tgs` sticker archive
#[must_use]
pub fn is_animated_archive(url: &str) -> bool {
    strip_query(url).to_lowercase().ends_with(".tgs")
}

/// Moves assets into CDN storage.
#[derive(Clone)]
pub struct AssetMigrator {
    cdn: Arc<dyn CdnClient>,
    http: reqwest::Client,
    folder: String,
}

impl AssetMigrator {
    /// Create a migrator uploading into `folder`
    #[must_use]
    pub fn new(cdn: Arc<dyn CdnClient>, folder: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(get_cdn_http_timeout_secs()))
            .build()
            .unwrap_or_default();
        Self {
            cdn,
            http,
            folder: folder.into(),
        }
    }

    /// Create a migrator using the configured folder
    #[must_use]
    pub fn from_settings(cdn: Arc<dyn CdnClient>, settings: &CatalogSettings) -> Self {
        Self::new(cdn, settings.cdn_folder.clone())
    }

    /// Folder assets are uploaded into
    #[must_use]
    pub fn folder(&self) -> &str {
        &self.folder
    }

    /// Migrate one asset.
    ///
    /// Images are handed to the CDN as-is. Animated archives are downloaded
    /// in full and uploaded as a base64 data URI with overwrite disabled.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError`] if the download or upload fails.
    #[instrument(skip(self, source_url))]
    pub async fn migrate(
        &self,
        source_url: &str,
        is_animated_archive: bool,
    ) -> Result<MigratedAsset, MigrationError> {
        let (source, resource_type, overwrite) = if is_animated_archive {
            let bytes = self.download(source_url).await?;
            (encode_data_uri(TGS_MIME, &bytes), ResourceType::Raw, false)
        } else {
            (source_url.to_string(), ResourceType::Image, true)
        };

        let options = UploadOptions {
            folder: self.folder.clone(),
            resource_type,
            overwrite,
            public_id: None,
        };
        let uploaded = self.cdn.upload(&source, &options).await?;
        debug!(public_id = %uploaded.public_id, "Asset migrated");

        Ok(MigratedAsset {
            url: uploaded.secure_url,
            is_animated: is_animated_archive,
        })
    }

    /// Migrate one asset, detecting animated archives from the URL.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError`] if the download or upload fails.
    pub async fn migrate_detected(&self, source_url: &str) -> Result<MigratedAsset, MigrationError> {
        self.migrate(source_url, is_animated_archive(source_url)).await
    }

    /// Migrate many assets concurrently.
    ///
    /// Never fails as a whole: failed migrations are logged and dropped, so
    /// N inputs with K failures yield N−K assets in input order.
    pub async fn migrate_all(&self, sources: &[AssetSource]) -> Vec<MigratedAsset> {
        let results: Vec<Option<MigratedAsset>> = join_all(sources.iter().map(|source| async move {
            match self.migrate(&source.url, source.is_animated_archive).await {
                Ok(asset) => Some(asset),
                Err(e) => {
                    warn!(error = %e, animated = source.is_animated_archive, "Asset migration failed");
                    None
                }
            }
        }))
        .await;

        let migrated: Vec<MigratedAsset> = results.into_iter().flatten().collect();
        info!(
            requested = sources.len(),
            migrated = migrated.len(),
            "Batch migration finished"
        );
        migrated
    }

    /// Delete a migrated asset. Failures are logged and swallowed.
    pub async fn delete_asset(&self, url: &str) {
        let Some(public_id) = public_id_from_url(url) else {
            warn!(url, "Cannot derive public id, skipping asset deletion");
            return;
        };
        let resource_type = ResourceType::infer_from_url(url);
        if let Err(e) = self.cdn.destroy(&public_id, resource_type).await {
            warn!(public_id = %public_id, error = %e, "Asset deletion failed");
        }
    }

    /// Delete many migrated assets, one batch per resource type.
    /// Failures are logged and swallowed.
    pub async fn delete_assets(&self, urls: &[String]) {
        let mut groups: HashMap<ResourceType, Vec<String>> = HashMap::new();
        for url in urls {
            match public_id_from_url(url) {
                Some(public_id) => groups
                    .entry(ResourceType::infer_from_url(url))
                    .or_default()
                    .push(public_id),
                None => warn!(url = %url, "Cannot derive public id, skipping asset deletion"),
            }
        }

        for (resource_type, public_ids) in groups {
            if let Err(e) = self.cdn.batch_destroy(&public_ids, resource_type).await {
                warn!(
                    resource_type = resource_type.as_str(),
                    count = public_ids.len(),
                    error = %e,
                    "Batch asset deletion failed"
                );
            }
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, MigrationError> {
        let response = retry_transport_operation(
            || async { self.http.get(url).send().await },
            |e: &reqwest::Error| e.is_timeout() || e.is_connect(),
        )
        .await
        .map_err(|e| MigrationError::Download(e.without_url().to_string()))?
        .error_for_status()
        .map_err(|e| MigrationError::Download(e.without_url().to_string()))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| MigrationError::Download(e.without_url().to_string()))?;
        Ok(bytes.to_vec())
    }
}
