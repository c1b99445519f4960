//! Cloudflare R2 / AWS S3 backed [`CdnClient`].

use std::time::Duration;

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use aws_sdk_s3::Client;
use aws_types::region::Region;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{
    decode_data_uri, extension_for, CdnClient, CdnError, ResourceType, UploadOptions,
    UploadedAsset, UPLOAD_MARKER,
};
use crate::config::{get_cdn_http_timeout_secs, CatalogSettings};
use crate::utils::retry_transport_operation;

/// Maximum keys accepted by a single `DeleteObjects` call
const DELETE_BATCH_SIZE: usize = 1000;

/// R2-backed CDN implementation
pub struct R2Cdn {
    client: Client,
    http: reqwest::Client,
    bucket: String,
    public_base_url: String,
}

impl R2Cdn {
    /// Create a new R2 CDN client
    ///
    /// # Errors
    ///
    /// Returns an error if R2 configuration is missing.
    pub async fn new(settings: &CatalogSettings) -> Result<Self, CdnError> {
        let endpoint_url = settings
            .r2_endpoint_url
            .as_ref()
            .ok_or_else(|| CdnError::Config("R2_ENDPOINT_URL is missing".into()))?;
        let access_key = settings
            .r2_access_key_id
            .as_ref()
            .ok_or_else(|| CdnError::Config("R2_ACCESS_KEY_ID is missing".into()))?;
        let secret_key = settings
            .r2_secret_access_key
            .as_ref()
            .ok_or_else(|| CdnError::Config("R2_SECRET_ACCESS_KEY is missing".into()))?;
        let bucket = settings
            .r2_bucket_name
            .as_ref()
            .ok_or_else(|| CdnError::Config("R2_BUCKET_NAME is missing".into()))?;
        let public_base_url = settings
            .cdn_base_url()
            .ok_or_else(|| CdnError::Config("CDN_PUBLIC_URL is missing".into()))?;

        let credentials = Credentials::new(access_key, secret_key, None, None, "r2-cdn");

        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new("auto"))
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .endpoint_url(endpoint_url)
            .force_path_style(true)
            .build();

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(get_cdn_http_timeout_secs()))
            .build()
            .map_err(|e| CdnError::Config(format!("HTTP client: {e}")))?;

        Ok(Self {
            client: Client::from_conf(s3_config),
            http,
            bucket: bucket.clone(),
            public_base_url,
        })
    }

    /// Load the bytes behind an upload source.
    async fn fetch_source(&self, source: &str) -> Result<(String, Vec<u8>), CdnError> {
        if source.starts_with("data:") {
            return decode_data_uri(source);
        }
        if !(source.starts_with("http://") || source.starts_with("https://")) {
            return Err(CdnError::InvalidSource(
                "expected an http(s) URL or a data URI".into(),
            ));
        }

        let response = retry_transport_operation(
            || async { self.http.get(source).send().await },
            |e: &reqwest::Error| e.is_timeout() || e.is_connect(),
        )
        .await
        .map_err(|e| CdnError::Download(e.without_url().to_string()))?
        .error_for_status()
        .map_err(|e| CdnError::Download(e.without_url().to_string()))?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| CdnError::Download(e.without_url().to_string()))?;
        Ok((content_type, bytes.to_vec()))
    }

    /// All stored keys of an asset, whatever their extension.
    async fn keys_for(
        &self,
        public_id: &str,
        resource_type: ResourceType,
    ) -> Result<Vec<String>, CdnError> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(key_prefix(resource_type, public_id))
            .send()
            .await
            .map_err(|e| CdnError::Delete(e.to_string()))?;

        Ok(output
            .contents()
            .iter()
            .filter_map(|obj| obj.key().map(ToString::to_string))
            .collect())
    }

    async fn delete_keys(&self, keys: Vec<String>) -> Result<(), CdnError> {
        for chunk in keys.chunks(DELETE_BATCH_SIZE) {
            let objects = chunk
                .iter()
                .map(|key| {
                    ObjectIdentifier::builder()
                        .key(key)
                        .build()
                        .map_err(|e| CdnError::Delete(e.to_string()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
                .map_err(|e| CdnError::Delete(e.to_string()))?;

            let output = self
                .client
                .delete_objects()
                .bucket(&self.bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|e| CdnError::Delete(e.to_string()))?;

            if let Some(first) = output.errors().first() {
                return Err(CdnError::Delete(format!(
                    "{} object(s) not deleted, first: {} ({})",
                    output.errors().len(),
                    first.key().unwrap_or_default(),
                    first.message().unwrap_or_default()
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CdnClient for R2Cdn {
    async fn upload(&self, source: &str, options: &UploadOptions) -> Result<UploadedAsset, CdnError> {
        let (content_type, bytes) = self.fetch_source(source).await?;
        let url_hint = (!source.starts_with("data:")).then_some(source);
        let ext = extension_for(&content_type, url_hint);

        let public_id = join_public_id(&options.folder, &asset_id(options));
        let key = object_key(options.resource_type, &public_id, &ext);
        let size = bytes.len();

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(bytes))
            .content_type(content_type);
        if !options.overwrite {
            request = request.if_none_match("*");
        }

        match request.send().await {
            Ok(_) => info!(key = %key, size, "Stored asset"),
            Err(SdkError::ServiceError(err))
                if err.raw().status().as_u16() == 412
                    || err.err().code() == Some("PreconditionFailed") =>
            {
                debug!(key = %key, "Asset already stored, keeping existing object");
            }
            Err(e) => return Err(CdnError::Upload(e.to_string())),
        }

        Ok(UploadedAsset {
            secure_url: public_url(&self.public_base_url, &key),
            public_id,
        })
    }

    async fn destroy(&self, public_id: &str, resource_type: ResourceType) -> Result<(), CdnError> {
        let keys = self.keys_for(public_id, resource_type).await?;
        if keys.is_empty() {
            warn!(public_id, resource_type = resource_type.as_str(), "Nothing to delete");
            return Ok(());
        }
        for key in &keys {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| CdnError::Delete(e.to_string()))?;
        }
        info!(public_id, deleted = keys.len(), "Deleted asset");
        Ok(())
    }

    async fn batch_destroy(
        &self,
        public_ids: &[String],
        resource_type: ResourceType,
    ) -> Result<(), CdnError> {
        let mut keys = Vec::new();
        for public_id in public_ids {
            keys.extend(self.keys_for(public_id, resource_type).await?);
        }
        if keys.is_empty() {
            return Ok(());
        }
        let count = keys.len();
        self.delete_keys(keys).await?;
        info!(
            requested = public_ids.len(),
            deleted = count,
            resource_type = resource_type.as_str(),
            "Deleted assets"
        );
        Ok(())
    }

    async fn check_connection(&self) -> Result<(), String> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {
                info!("Successfully connected to R2 CDN bucket.");
                Ok(())
            }
            Err(e) => {
                let err_msg = format!("R2 connectivity test failed: {e:#?}");
                error!("{}", err_msg);
                Err(err_msg)
            }
        }
    }
}

/// `folder/id`, or `id` alone when no folder is configured
fn join_public_id(folder: &str, id: &str) -> String {
    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        id.to_string()
    } else {
        format!("{folder}/{id}")
    }
}

/// Returns the object key for an asset
#[must_use]
pub fn object_key(resource_type: ResourceType, public_id: &str, ext: &str) -> String {
    format!(
        "{}{UPLOAD_MARKER}{public_id}.{ext}",
        resource_type.as_str()
    )
}

/// Key prefix shared by every extension of an asset
fn key_prefix(resource_type: ResourceType, public_id: &str) -> String {
    format!("{}{UPLOAD_MARKER}{public_id}.", resource_type.as_str())
}

fn public_url(base: &str, key: &str) -> String {
    format!("{}/{key}", base.trim_end_matches('/'))
}

/// Caller-chosen id, or a fresh one so records never share an object
fn asset_id(options: &UploadOptions) -> String {
    options
        .public_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().simple().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdn::public_id_from_url;

    #[test]
    fn test_object_key_layout() {
        assert_eq!(
            object_key(ResourceType::Image, "telegram_images/abc", "jpg"),
            "image/upload/telegram_images/abc.jpg"
        );
        assert_eq!(
            object_key(ResourceType::Raw, "telegram_images/f00d", "tgs"),
            "raw/upload/telegram_images/f00d.tgs"
        );
        assert_eq!(
            key_prefix(ResourceType::Raw, "telegram_images/f00d"),
            "raw/upload/telegram_images/f00d."
        );
    }

    #[test]
    fn test_public_url_round_trips_to_public_id() {
        let public_id = join_public_id("/telegram_images/", "abc");
        let key = object_key(ResourceType::Image, &public_id, "webp");
        let url = public_url("https://cdn.example.com/", &key);
        assert_eq!(url, "https://cdn.example.com/image/upload/telegram_images/abc.webp");
        assert_eq!(public_id_from_url(&url), Some(public_id));
    }

    fn raw_options() -> UploadOptions {
        UploadOptions {
            folder: "telegram_images".to_string(),
            resource_type: ResourceType::Raw,
            overwrite: false,
            public_id: None,
        }
    }

    #[test]
    fn test_same_archive_uploaded_twice_gets_separate_objects() {
        let options = raw_options();
        let first = join_public_id(&options.folder, &asset_id(&options));
        let second = join_public_id(&options.folder, &asset_id(&options));
        assert_ne!(first, second);

        // Deleting the second record's asset must not match the first one's key
        let first_key = object_key(ResourceType::Raw, &first, "tgs");
        assert!(!first_key.starts_with(&key_prefix(ResourceType::Raw, &second)));
        assert!(first_key.starts_with(&key_prefix(ResourceType::Raw, &first)));
    }

    #[test]
    fn test_explicit_public_id_is_kept() {
        let options = UploadOptions {
            public_id: Some("avatar_42".to_string()),
            ..raw_options()
        };
        assert_eq!(asset_id(&options), "avatar_42");
    }

    #[test]
    fn test_join_public_id_without_folder() {
        assert_eq!(join_public_id("", "abc"), "abc");
    }
}
