//! Object storage (CDN) client
//!
//! Assets are addressed the way a media CDN addresses them: a resource type
//! (`image` or `raw`), a folder and a public id. Public URLs carry all three,
//! `{base}/{resource_type}/upload/{folder}/{id}.{ext}`, so an asset can be
//! deleted knowing only its URL.

mod r2;

pub use r2::R2Cdn;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

use crate::utils::strip_query;

/// Path marker between the resource type and the public id
pub const UPLOAD_MARKER: &str = "/upload/";

/// MIME type of animated `.tgs` sticker archives
pub const TGS_MIME: &str = "application/x-tgsticker";

/// Errors that can occur during CDN operations
#[derive(Debug, Error)]
pub enum CdnError {
    /// Source is neither a URL nor a base64 data URI
    #[error("Invalid upload source: {0}")]
    InvalidSource(String),
    /// Source could not be fetched
    #[error("Download failed: {0}")]
    Download(String),
    /// Object could not be stored
    #[error("Upload failed: {0}")]
    Upload(String),
    /// Object could not be removed
    #[error("Delete failed: {0}")]
    Delete(String),
    /// Configuration error (missing credentials, etc.)
    #[error("Configuration error: {0}")]
    Config(String),
}

/// CDN resource type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    /// Still images (avatars, static stickers)
    Image,
    /// Opaque files (animated sticker archives)
    Raw,
}

impl ResourceType {
    /// Path segment used in keys and URLs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Raw => "raw",
        }
    }

    /// Infer the resource type of an already-stored asset from its URL.
    #[must_use]
    pub fn infer_from_url(url: &str) -> Self {
        let path = strip_query(url);
        if path.contains("/raw/upload/") || path.to_lowercase().ends_with(".tgs") {
            Self::Raw
        } else {
            Self::Image
        }
    }
}

/// Upload parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    /// Folder the asset is placed in
    pub folder: String,
    /// Resource type
    pub resource_type: ResourceType,
    /// Replace an existing object with the same public id
    pub overwrite: bool,
    /// Explicit public id (without folder); generated when absent
    pub public_id: Option<String>,
}

/// Result of a successful upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedAsset {
    /// `folder/id`
    pub public_id: String,
    /// Permanent public URL
    pub secure_url: String,
}

/// Interface for CDN providers
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CdnClient: Send + Sync {
    /// Upload from a URL or a base64 data URI
    async fn upload(&self, source: &str, options: &UploadOptions) -> Result<UploadedAsset, CdnError>;
    /// Delete one asset
    async fn destroy(&self, public_id: &str, resource_type: ResourceType) -> Result<(), CdnError>;
    /// Delete several assets of the same resource type
    async fn batch_destroy(
        &self,
        public_ids: &[String],
        resource_type: ResourceType,
    ) -> Result<(), CdnError>;
    /// Check connection to the CDN
    async fn check_connection(&self) -> Result<(), String>;
}

/// Build a base64 data URI.
#[must_use]
pub fn encode_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// Split a base64 data URI into its MIME type and decoded bytes.
///
/// # Errors
///
/// Returns [`CdnError::InvalidSource`] if the input is not a base64 data URI.
pub fn decode_data_uri(source: &str) -> Result<(String, Vec<u8>), CdnError> {
    let rest = source
        .strip_prefix("data:")
        .ok_or_else(|| CdnError::InvalidSource("not a data URI".into()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| CdnError::InvalidSource("data URI without payload".into()))?;
    let mime = meta
        .strip_suffix(";base64")
        .ok_or_else(|| CdnError::InvalidSource("only base64 data URIs are supported".into()))?;
    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| CdnError::InvalidSource(format!("bad base64 payload: {e}")))?;
    let mime = if mime.is_empty() {
        "application/octet-stream"
    } else {
        mime
    };
    Ok((mime.to_string(), bytes))
}

/// Derive the `folder/id` public id from a stored asset's URL.
///
/// Takes everything after `/upload/` (skipping a `v<digits>` version
/// segment), drops the query string and cuts the file name at its first
/// `.`. Without an `/upload/` marker only the last path segment is used.
/// Returns `None` when no id can be derived.
#[must_use]
pub fn public_id_from_url(url: &str) -> Option<String> {
    let path = strip_query(url.trim());
    let tail = match path.split_once(UPLOAD_MARKER) {
        Some((_, rest)) => skip_version_segment(rest),
        None => path.rsplit('/').next()?,
    };

    let (dir, file) = match tail.rsplit_once('/') {
        Some((dir, file)) => (dir, file),
        None => ("", tail),
    };
    let stem = file.split('.').next().unwrap_or(file);
    if stem.is_empty() {
        return None;
    }
    if dir.is_empty() {
        Some(stem.to_string())
    } else {
        Some(format!("{dir}/{stem}"))
    }
}

fn skip_version_segment(path: &str) -> &str {
    match path.split_once('/') {
        Some((first, rest))
            if first.len() > 1
                && first.starts_with('v')
                && first[1..].chars().all(|c| c.is_ascii_digit()) =>
        {
            rest
        }
        _ => path,
    }
}

/// File extension for a content type, falling back to the URL's own extension.
#[must_use]
pub fn extension_for(content_type: &str, source_url: Option<&str>) -> String {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    let known = match mime.as_str() {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "video/webm" => Some("webm"),
        TGS_MIME => Some("tgs"),
        _ => None,
    };
    if let Some(ext) = known {
        return ext.to_string();
    }

    source_url
        .map(strip_query)
        .and_then(|url| url.rsplit('/').next())
        .and_then(|file| file.rsplit_once('.'))
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "bin".to_string())
}
