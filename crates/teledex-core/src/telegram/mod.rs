//! Telegram Bot API abstraction
//!
//! The resolver only talks to Telegram through [`TelegramApi`], so tests can
//! substitute the network with mocks and the production adapter can add retries.

mod bot;

pub use bot::TeloxideApi;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while talking to the Telegram Bot API
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TelegramError {
    /// Telegram reports that the chat, user, sticker set or file does not exist
    #[error("Telegram entity not found: {0}")]
    NotFound(String),
    /// Any other error reported by the Bot API (auth, permissions, flood control)
    #[error("Telegram API error: {0}")]
    Api(String),
    /// Transport-level failure talking to the Bot API
    #[error("Telegram network error: {0}")]
    Network(String),
}

impl TelegramError {
    /// Whether retrying the same call may succeed
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

/// Chat type as reported by `getChat`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    /// One-to-one chat with a user or a bot
    Private,
    /// Basic group
    Group,
    /// Supergroup
    Supergroup,
    /// Broadcast channel
    Channel,
}

impl ChatType {
    /// Lower-case name used by the Bot API
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Group => "group",
            Self::Supergroup => "supergroup",
            Self::Channel => "channel",
        }
    }
}

/// Subset of `getChat` output the catalog cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatInfo {
    /// Numeric chat id (equals the user id for private chats)
    pub id: i64,
    /// Chat type
    pub chat_type: ChatType,
    /// Title for groups and channels
    pub title: Option<String>,
    /// First name for private chats
    pub first_name: Option<String>,
    /// Last name for private chats
    pub last_name: Option<String>,
    /// Public username without the leading `@`
    pub username: Option<String>,
    /// Description (groups/channels) or bio (private chats)
    pub description: Option<String>,
    /// File id of the big chat photo, if any
    pub photo_file_id: Option<String>,
}

/// A sticker inside a sticker set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StickerInfo {
    /// File id usable with `getFile`
    pub file_id: String,
    /// Whether the sticker is a gzip-compressed Lottie (`.tgs`) archive
    pub is_animated: bool,
    /// Whether the sticker is a WEBM video
    pub is_video: bool,
}

/// Subset of `getStickerSet` output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StickerSetInfo {
    /// Sticker set short name
    pub name: String,
    /// Sticker set title
    pub title: String,
    /// Stickers in set order
    pub stickers: Vec<StickerInfo>,
}

/// Result of `getFile`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// File path relative to the file download endpoint
    pub path: String,
}

/// One size variant of a profile photo
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoSizeInfo {
    /// File id usable with `getFile`
    pub file_id: String,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

/// Result of `getUserProfilePhotos`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProfilePhotos {
    /// Total number of profile photos the user has
    pub total_count: u32,
    /// Requested photos, each as size variants from smallest to largest
    pub photos: Vec<Vec<PhotoSizeInfo>>,
}

/// Interface to the Telegram Bot API used by the resolver
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TelegramApi: Send + Sync {
    /// Fetch chat information for `@username` or a numeric id
    async fn get_chat(&self, handle: &str) -> Result<ChatInfo, TelegramError>;
    /// Fetch the member count of a group or channel
    async fn get_chat_member_count(&self, handle: &str) -> Result<u32, TelegramError>;
    /// Fetch a sticker set by its short name
    async fn get_sticker_set(&self, name: &str) -> Result<StickerSetInfo, TelegramError>;
    /// Resolve a file id to a downloadable path
    async fn get_file(&self, file_id: &str) -> Result<FileInfo, TelegramError>;
    /// Fetch a page of a user's profile photos
    async fn get_user_profile_photos(
        &self,
        user_id: u64,
        offset: u32,
        limit: u8,
    ) -> Result<ProfilePhotos, TelegramError>;
    /// Build the token-authenticated download URL for a file path.
    ///
    /// The result embeds the bot token and expires; it must never be persisted.
    fn file_download_url(&self, file_path: &str) -> String;
}

/// Build a Bot API file download URL.
#[must_use]
pub fn file_download_url(api_url: &str, token: &str, file_path: &str) -> String {
    format!(
        "{}/file/bot{token}/{}",
        api_url.trim_end_matches('/'),
        file_path.trim_start_matches('/')
    )
}

/// Prefix a bare username with `@` for chat lookups.
#[must_use]
pub fn chat_handle(username: &str) -> String {
    if username.starts_with('@') {
        username.to_string()
    } else {
        format!("@{username}")
    }
}
