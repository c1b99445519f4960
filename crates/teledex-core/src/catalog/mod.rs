//! Catalog records, stores and moderation workflows
//!
//! Records are what moderators curate and what the public listing shows.
//! Storage is behind [`CatalogStore`] / [`CategoryStore`]; the workflows
//! (asset migration on create, asset cleanup on delete, moderation rules)
//! live in [`CatalogService`].

mod memory;
mod mongo;
mod service;

pub use memory::MemoryCatalog;
pub use mongo::MongoCatalog;
pub use service::CatalogService;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::migrator::MigrationError;
use crate::resolver::StickerSetSummary;

/// Errors that can occur during catalog operations
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Record or category does not exist
    #[error("Not found: {0}")]
    NotFound(String),
    /// Unique constraint violated
    #[error("Already exists: {0}")]
    Duplicate(String),
    /// Moderation status change not allowed
    #[error("Cannot change status from {from} to {to}")]
    InvalidTransition {
        /// Current status
        from: ModerationStatus,
        /// Requested status
        to: ModerationStatus,
    },
    /// Request content is invalid
    #[error("Validation error: {0}")]
    Validation(String),
    /// Backing store failure
    #[error("Database error: {0}")]
    Database(String),
    /// Avatar migration failed
    #[error(transparent)]
    Migration(#[from] MigrationError),
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Media type of a catalog record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// Bot
    Bot,
    /// Group or supergroup
    Group,
    /// Channel
    Channel,
    /// Sticker pack
    Sticker,
}

impl MediaType {
    /// Lower-case name used in storage and URLs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bot => "bot",
            Self::Group => "group",
            Self::Channel => "channel",
            Self::Sticker => "sticker",
        }
    }

    /// Normalize a reported type; `supergroup` folds into `group`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Validation`] for anything that is not a catalog type.
    pub fn normalize(raw: &str) -> Result<Self, CatalogError> {
        match raw.trim().to_lowercase().as_str() {
            "bot" => Ok(Self::Bot),
            "group" | "supergroup" => Ok(Self::Group),
            "channel" => Ok(Self::Channel),
            "sticker" => Ok(Self::Sticker),
            other => Err(CatalogError::Validation(format!(
                "unsupported media type {other:?}"
            ))),
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Moderation status of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ModerationStatus {
    /// Awaiting review
    #[default]
    Pending,
    /// Publicly listed
    Approved,
    /// Refused
    Rejected,
}

impl ModerationStatus {
    /// Stored name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
        }
    }

    /// Check a status change. Only `Pending` records can be decided;
    /// keeping the current status is always allowed.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidTransition`] for any other change.
    pub fn transition_to(self, next: Self) -> Result<Self, CatalogError> {
        match (self, next) {
            (from, to) if from == to => Ok(to),
            (Self::Pending, Self::Approved | Self::Rejected) => Ok(next),
            (from, to) => Err(CatalogError::InvalidTransition { from, to }),
        }
    }
}

impl std::fmt::Display for ModerationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted catalog record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRecord {
    /// Record id (hex object id)
    #[serde(rename = "_id")]
    pub id: String,
    /// Source Telegram link
    #[serde(default)]
    pub url: String,
    /// Permanent avatar URL
    #[serde(default)]
    pub image_url: Option<String>,
    /// Display name
    pub name: String,
    /// Members or stickers
    #[serde(default)]
    pub member_count: u64,
    /// Submission time (RFC 3339)
    pub date: String,
    /// Submitting author
    pub author: String,
    /// Category name
    #[serde(default)]
    pub category: Option<String>,
    /// Language
    #[serde(default)]
    pub language: Option<String>,
    /// Featured on the front page
    #[serde(default)]
    pub featured: bool,
    /// Tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Description
    #[serde(default)]
    pub description: String,
    /// NSFW flag
    #[serde(default)]
    pub nsfw: bool,
    /// Moderation status
    #[serde(default)]
    pub status: ModerationStatus,
    /// Media type
    pub media_type: MediaType,
    /// Permanent sticker URLs, in set order
    #[serde(default)]
    pub sticker_images: Vec<String>,
    /// Pack contains animated stickers
    #[serde(default)]
    pub animated_sticker: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl MediaRecord {
    /// All stored asset URLs of this record
    #[must_use]
    pub fn asset_urls(&self) -> Vec<String> {
        self.image_url
            .iter()
            .chain(self.sticker_images.iter())
            .cloned()
            .collect()
    }
}

/// Submission of a new record, usually a resolved payload plus curation fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaDraft {
    /// Source Telegram link
    #[serde(default)]
    pub url: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Members or stickers
    #[serde(default)]
    pub member_count: u64,
    /// Transient avatar URL to migrate
    #[serde(default)]
    pub image_url: Option<String>,
    /// Description
    #[serde(default)]
    pub description: String,
    /// Reported type (`group`, `supergroup`, `channel`, `bot`, `sticker`)
    #[serde(rename = "type", alias = "mediaType", default)]
    pub media_type: String,
    /// NSFW flag
    #[serde(default, alias = "isNSFW")]
    pub nsfw: bool,
    /// Category name
    #[serde(default)]
    pub category: Option<String>,
    /// Language
    #[serde(default)]
    pub language: Option<String>,
    /// Featured flag
    #[serde(default)]
    pub featured: bool,
    /// Tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Sticker set whose stickers are migrated
    #[serde(default)]
    pub sticker_set: Option<StickerSetSummary>,
}

/// Whitelisted record update. Unknown fields are rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MediaPatch {
    /// New name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New category
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// New language
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// New featured flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub featured: Option<bool>,
    /// New tags
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// New NSFW flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nsfw: Option<bool>,
    /// New moderation status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ModerationStatus>,
    /// New member count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_count: Option<u64>,
}

impl MediaPatch {
    /// Validate the patch against the current record without modifying it.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Validation`] for empty names and
    /// [`CatalogError::InvalidTransition`] for disallowed status changes.
    pub fn validate(&self, current: &MediaRecord) -> Result<(), CatalogError> {
        if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(CatalogError::Validation("name must not be empty".into()));
        }
        if let Some(next) = self.status {
            current.status.transition_to(next)?;
        }
        Ok(())
    }

    /// Validate and merge into `record`. Returns whether anything changed.
    ///
    /// # Errors
    ///
    /// See [`MediaPatch::validate`]. The record is untouched on error.
    pub fn apply(&self, record: &mut MediaRecord, now: DateTime<Utc>) -> Result<bool, CatalogError> {
        self.validate(record)?;
        let before = record.clone();

        if let Some(name) = &self.name {
            record.name.clone_from(name);
        }
        if let Some(description) = &self.description {
            record.description.clone_from(description);
        }
        if let Some(category) = &self.category {
            record.category = Some(category.clone());
        }
        if let Some(language) = &self.language {
            record.language = Some(language.clone());
        }
        if let Some(featured) = self.featured {
            record.featured = featured;
        }
        if let Some(tags) = &self.tags {
            record.tags.clone_from(tags);
        }
        if let Some(nsfw) = self.nsfw {
            record.nsfw = nsfw;
        }
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(member_count) = self.member_count {
            record.member_count = member_count;
        }

        let changed = *record != before;
        if changed {
            record.updated_at = now;
        }
        Ok(changed)
    }
}

/// One element of a bulk update: `{"id": .., <patch fields>}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaBulkUpdate {
    /// Record id
    pub id: String,
    /// Fields to change
    #[serde(flatten)]
    pub patch: MediaPatch,
}

// Unknown fields must be rejected here too; `#[serde(flatten)]` would ignore them.
impl<'de> Deserialize<'de> for MediaBulkUpdate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut fields = serde_json::Map::<String, Value>::deserialize(deserializer)?;
        let id = match fields.remove("id") {
            Some(Value::String(id)) if !id.is_empty() => id,
            Some(_) => return Err(de::Error::custom("id must be a non-empty string")),
            None => return Err(de::Error::missing_field("id")),
        };
        let patch = MediaPatch::deserialize(Value::Object(fields)).map_err(de::Error::custom)?;
        Ok(Self { id, patch })
    }
}

/// Projection used by the moderation queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSummary {
    /// Record id
    #[serde(rename = "_id")]
    pub id: String,
    /// Avatar URL
    pub photo: Option<String>,
    /// Submission time
    pub date: String,
    /// Author
    pub author: String,
    /// Name
    pub name: String,
    /// Status
    pub status: ModerationStatus,
    /// Description
    pub description: String,
    /// Members or stickers
    pub member_count: u64,
}

impl From<MediaRecord> for PendingSummary {
    fn from(record: MediaRecord) -> Self {
        Self {
            id: record.id,
            photo: record.image_url,
            date: record.date,
            author: record.author,
            name: record.name,
            status: record.status,
            description: record.description,
            member_count: record.member_count,
        }
    }
}

/// Status condition of a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    /// Any status
    #[default]
    Any,
    /// Exactly this status
    Is(ModerationStatus),
    /// Any status but this one
    Not(ModerationStatus),
}

impl StatusFilter {
    /// Whether a status passes the filter
    #[must_use]
    pub fn matches(self, status: ModerationStatus) -> bool {
        match self {
            Self::Any => true,
            Self::Is(wanted) => status == wanted,
            Self::Not(unwanted) => status != unwanted,
        }
    }
}

/// Listing query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaFilter {
    /// Status condition
    pub status: StatusFilter,
    /// Restrict to a media type
    pub media_type: Option<MediaType>,
    /// Leave out this record id
    pub exclude_id: Option<String>,
    /// Maximum number of records
    pub limit: Option<i64>,
}

impl MediaFilter {
    /// Whether a record passes every condition except `limit`
    #[must_use]
    pub fn matches(&self, record: &MediaRecord) -> bool {
        self.status.matches(record.status)
            && self.media_type.is_none_or(|t| t == record.media_type)
            && self.exclude_id.as_deref() != Some(record.id.as_str())
    }
}

/// A category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    /// Category id
    #[serde(rename = "_id")]
    pub id: String,
    /// Unique name
    pub category: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

/// Persistence of catalog records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert a record; the store assigns the id
    async fn insert(&self, record: MediaRecord) -> Result<MediaRecord, CatalogError>;
    /// Get a record by id
    async fn get(&self, id: &str) -> Result<Option<MediaRecord>, CatalogError>;
    /// Get every existing record among `ids`
    async fn get_many(&self, ids: &[String]) -> Result<Vec<MediaRecord>, CatalogError>;
    /// List records matching a filter
    async fn list(&self, filter: &MediaFilter) -> Result<Vec<MediaRecord>, CatalogError>;
    /// Replace a stored record; returns whether it existed
    async fn replace(&self, record: &MediaRecord) -> Result<bool, CatalogError>;
    /// Delete a record; returns whether it existed
    async fn delete(&self, id: &str) -> Result<bool, CatalogError>;
    /// Delete records; returns how many existed
    async fn delete_many(&self, ids: &[String]) -> Result<u64, CatalogError>;
    /// Check connection to the store
    async fn check_connection(&self) -> Result<(), String>;
}

/// Persistence of categories
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CategoryStore: Send + Sync {
    /// Create a category
    async fn create_category(&self, name: &str) -> Result<Category, CatalogError>;
    /// All category names
    async fn list_categories(&self) -> Result<Vec<String>, CatalogError>;
    /// Rename a category; `None` if it does not exist
    async fn rename_category(&self, old: &str, new: &str) -> Result<Option<Category>, CatalogError>;
    /// Delete a category; returns whether it existed
    async fn delete_category(&self, name: &str) -> Result<bool, CatalogError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: ModerationStatus) -> MediaRecord {
        let now = Utc::now();
        MediaRecord {
            id: "65f0c0ffee0000000000beef".to_string(),
            url: "https://t.me/examplechannel".to_string(),
            image_url: Some("https://cdn/image/upload/f/a.jpg".to_string()),
            name: "Example".to_string(),
            member_count: 10,
            date: now.to_rfc3339(),
            author: "mod@example.com".to_string(),
            category: None,
            language: None,
            featured: false,
            tags: Vec::new(),
            description: String::new(),
            nsfw: false,
            status,
            media_type: MediaType::Channel,
            sticker_images: vec!["https://cdn/raw/upload/f/s.tgs".to_string()],
            animated_sticker: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_media_type_normalization() {
        assert_eq!(MediaType::normalize("supergroup").ok(), Some(MediaType::Group));
        assert_eq!(MediaType::normalize("Channel").ok(), Some(MediaType::Channel));
        assert!(matches!(
            MediaType::normalize("private"),
            Err(CatalogError::Validation(_))
        ));
    }

    #[test]
    fn test_status_transitions() {
        use ModerationStatus::{Approved, Pending, Rejected};
        assert!(Pending.transition_to(Approved).is_ok());
        assert!(Pending.transition_to(Rejected).is_ok());
        assert!(Approved.transition_to(Approved).is_ok());
        assert!(matches!(
            Approved.transition_to(Pending),
            Err(CatalogError::InvalidTransition { from: Approved, to: Pending })
        ));
        assert!(Rejected.transition_to(Approved).is_err());
    }

    #[test]
    fn test_patch_rejects_unknown_and_protected_fields() {
        for body in [
            r#"{"author": "intruder"}"#,
            r#"{"_id": "x"}"#,
            r#"{"date": "2020-01-01"}"#,
            r#"{"imageUrl": "https://elsewhere"}"#,
        ] {
            assert!(
                serde_json::from_str::<MediaPatch>(body).is_err(),
                "{body} must be rejected"
            );
        }
        let patch: MediaPatch =
            serde_json::from_str(r#"{"name": "New", "memberCount": 5, "status": "Approved"}"#)
                .expect("whitelisted fields parse");
        assert_eq!(patch.member_count, Some(5));
    }

    #[test]
    fn test_patch_apply() {
        let mut rec = record(ModerationStatus::Pending);
        let before = rec.updated_at;
        let later = before + chrono::Duration::seconds(5);
        let patch = MediaPatch {
            status: Some(ModerationStatus::Approved),
            tags: Some(vec!["news".to_string()]),
            ..MediaPatch::default()
        };
        assert!(patch.apply(&mut rec, later).expect("valid patch"));
        assert_eq!(rec.status, ModerationStatus::Approved);
        assert_eq!(rec.tags, ["news"]);
        assert_eq!(rec.updated_at, later);

        // Re-applying changes nothing
        assert!(!patch.apply(&mut rec, later).expect("still valid"));
    }

    #[test]
    fn test_patch_invalid_transition_leaves_record_untouched() {
        let mut rec = record(ModerationStatus::Rejected);
        let patch = MediaPatch {
            name: Some("Renamed".to_string()),
            status: Some(ModerationStatus::Pending),
            ..MediaPatch::default()
        };
        assert!(patch.apply(&mut rec, Utc::now()).is_err());
        assert_eq!(rec.name, "Example");
    }

    #[test]
    fn test_bulk_update_parses_flattened_patch() {
        let update: MediaBulkUpdate =
            serde_json::from_str(r#"{"id": "abc", "featured": true}"#).expect("parses");
        assert_eq!(update.id, "abc");
        assert_eq!(update.patch.featured, Some(true));

        assert!(serde_json::from_str::<MediaBulkUpdate>(r#"{"id": "abc", "author": "x"}"#).is_err());
        assert!(serde_json::from_str::<MediaBulkUpdate>(r#"{"featured": true}"#).is_err());
    }

    #[test]
    fn test_filter_and_assets() {
        let rec = record(ModerationStatus::Pending);
        let filter = MediaFilter {
            status: StatusFilter::Not(ModerationStatus::Approved),
            media_type: Some(MediaType::Channel),
            ..MediaFilter::default()
        };
        assert!(filter.matches(&rec));
        let excluded = MediaFilter {
            exclude_id: Some(rec.id.clone()),
            ..MediaFilter::default()
        };
        assert!(!excluded.matches(&rec));
        assert_eq!(rec.asset_urls().len(), 2);
    }
}
