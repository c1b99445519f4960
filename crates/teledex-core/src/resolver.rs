//! Entity resolution against the Telegram Bot API
//!
//! Whole-entity lookups (the chat of a channel, the sticker set of a pack)
//! are hard failures. Everything decorative (avatars, member counts) is a
//! best-effort [`SoftLookup`] that degrades to "absent" instead of aborting.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::link::{ClassifiedTarget, EntityKind};
use crate::telegram::{chat_handle, ChatInfo, ChatType, TelegramApi, TelegramError};

/// Errors that abort a resolution request
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The link does not contain a usable identifier
    #[error("Invalid Telegram URL: {0:?}")]
    InvalidLink(String),
    /// Telegram reports that the entity does not exist
    #[error("Telegram entity not found: {0}")]
    EntityNotFound(String),
    /// Transport or authentication failure talking to Telegram
    #[error("Upstream error: {0}")]
    Upstream(String),
}

impl ResolveError {
    fn from_telegram(identifier: &str, err: TelegramError) -> Self {
        match err {
            TelegramError::NotFound(msg) => Self::EntityNotFound(format!("{identifier}: {msg}")),
            other => Self::Upstream(other.to_string()),
        }
    }
}

/// Outcome of a best-effort lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoftLookup<T> {
    /// Value resolved
    Found(T),
    /// Upstream answered, but there is nothing to resolve
    Missing,
    /// Upstream call failed; the caller degrades instead of aborting
    Failed(TelegramError),
}

impl<T> SoftLookup<T> {
    /// Collapse into an `Option`, logging soft failures.
    pub fn into_option(self, what: &str, identifier: &str) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            Self::Missing => {
                debug!(identifier, "No {what} available");
                None
            }
            Self::Failed(e) => {
                warn!(identifier, error = %e, "Failed to resolve {what}");
                None
            }
        }
    }

    /// Whether the lookup produced a value
    pub const fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

/// A sticker reference carried from resolution to migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StickerRef {
    /// Telegram file id
    pub file_id: String,
    /// Whether the sticker is an animated `.tgs` archive
    #[serde(default)]
    pub is_animated: bool,
}

/// Sticker set summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StickerSetSummary {
    /// Short name
    pub name: String,
    /// Title
    pub title: String,
    /// Stickers in set order
    pub stickers: Vec<StickerRef>,
}

/// Type tag reported for an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportedType {
    /// Private chat
    Private,
    /// Basic group
    Group,
    /// Supergroup
    Supergroup,
    /// Channel
    Channel,
    /// Bot account
    Bot,
    /// Sticker set
    Sticker,
}

impl From<ChatType> for ReportedType {
    fn from(value: ChatType) -> Self {
        match value {
            ChatType::Private => Self::Private,
            ChatType::Group => Self::Group,
            ChatType::Supergroup => Self::Supergroup,
            ChatType::Channel => Self::Channel,
        }
    }
}

/// Metadata fetched for a classified target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntity {
    /// Entity kind from classification
    pub kind: EntityKind,
    /// Type reported by Telegram (or `bot` / `sticker`)
    pub reported_type: ReportedType,
    /// Display title
    pub title: String,
    /// Description, bio or bot username
    pub description: String,
    /// Transient, token-authenticated avatar URL
    pub avatar_source_url: Option<String>,
    /// Members for chats, stickers for packs, 0 for bots
    pub count: u64,
    /// Present only for sticker packs
    pub sticker_set: Option<StickerSetSummary>,
}

/// Resolves classified targets into [`ResolvedEntity`] values.
#[derive(Clone)]
pub struct EntityResolver {
    api: Arc<dyn TelegramApi>,
}

impl EntityResolver {
    /// Create a resolver on top of a Telegram client
    #[must_use]
    pub fn new(api: Arc<dyn TelegramApi>) -> Self {
        Self { api }
    }

    /// Underlying Telegram client
    #[must_use]
    pub fn api(&self) -> &Arc<dyn TelegramApi> {
        &self.api
    }

    /// Resolve a classified target.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::EntityNotFound`] or [`ResolveError::Upstream`]
    /// when the primary lookup for a sticker pack or channel/group fails.
    /// Bot lookups never fail.
    #[instrument(skip_all, fields(kind = ?target.kind, identifier = %target.identifier))]
    pub async fn resolve(&self, target: &ClassifiedTarget) -> Result<ResolvedEntity, ResolveError> {
        let entity = match target.kind {
            EntityKind::StickerPack => self.resolve_sticker_pack(&target.identifier).await?,
            EntityKind::Bot => self.resolve_bot(&target.identifier).await,
            EntityKind::ChannelOrGroup => self.resolve_chat(&target.identifier).await?,
        };
        info!(
            title = %entity.title,
            count = entity.count,
            has_avatar = entity.avatar_source_url.is_some(),
            "Resolved Telegram entity"
        );
        Ok(entity)
    }

    async fn resolve_sticker_pack(&self, name: &str) -> Result<ResolvedEntity, ResolveError> {
        let set = self
            .api
            .get_sticker_set(name)
            .await
            .map_err(|e| ResolveError::from_telegram(name, e))?;

        let avatar_source_url = match set.stickers.first() {
            Some(first) => self.file_url(&first.file_id).await,
            None => SoftLookup::Missing,
        }
        .into_option("sticker preview", name);

        Ok(ResolvedEntity {
            kind: EntityKind::StickerPack,
            reported_type: ReportedType::Sticker,
            title: set.title.clone(),
            description: String::new(),
            avatar_source_url,
            count: set.stickers.len() as u64,
            sticker_set: Some(StickerSetSummary {
                name: set.name,
                title: set.title,
                stickers: set
                    .stickers
                    .into_iter()
                    .map(|s| StickerRef {
                        file_id: s.file_id,
                        is_animated: s.is_animated,
                    })
                    .collect(),
            }),
        })
    }

    async fn resolve_bot(&self, username: &str) -> ResolvedEntity {
        let chat = match self.api.get_chat(&chat_handle(username)).await {
            Ok(chat) => chat,
            Err(e) => {
                warn!(username, error = %e, "Bot lookup failed, using minimal bot info");
                return ResolvedEntity {
                    kind: EntityKind::Bot,
                    reported_type: ReportedType::Bot,
                    title: username.to_string(),
                    description: String::new(),
                    avatar_source_url: None,
                    count: 0,
                    sticker_set: None,
                };
            }
        };

        let title = bot_display_name(&chat).unwrap_or_else(|| username.to_string());
        let avatar_source_url = self.bot_avatar(&chat).await.into_option("bot avatar", username);

        ResolvedEntity {
            kind: EntityKind::Bot,
            reported_type: ReportedType::Bot,
            title,
            description: chat.username.clone().unwrap_or_default(),
            avatar_source_url,
            count: 0,
            sticker_set: None,
        }
    }

    async fn resolve_chat(&self, username: &str) -> Result<ResolvedEntity, ResolveError> {
        let handle = chat_handle(username);
        let chat = self
            .api
            .get_chat(&handle)
            .await
            .map_err(|e| ResolveError::from_telegram(username, e))?;

        let count = if chat.chat_type == ChatType::Private {
            0
        } else {
            self.member_count(&handle)
                .await
                .into_option("member count", username)
                .map_or(0, u64::from)
        };

        let avatar_source_url = match &chat.photo_file_id {
            Some(file_id) => self.file_url(file_id).await,
            None => SoftLookup::Missing,
        }
        .into_option("chat photo", username);

        Ok(ResolvedEntity {
            kind: EntityKind::ChannelOrGroup,
            reported_type: chat.chat_type.into(),
            title: chat.title.clone().unwrap_or_else(|| username.to_string()),
            description: chat.description.clone().unwrap_or_default(),
            avatar_source_url,
            count,
            sticker_set: None,
        })
    }

    /// Resolve a file id into a transient download URL.
    pub async fn file_url(&self, file_id: &str) -> SoftLookup<String> {
        match self.api.get_file(file_id).await {
            Ok(file) if file.path.is_empty() => SoftLookup::Missing,
            Ok(file) => SoftLookup::Found(self.api.file_download_url(&file.path)),
            Err(e) => SoftLookup::Failed(e),
        }
    }

    /// Whether a URL is a Bot API file download URL of this bot.
    #[must_use]
    pub fn is_file_url(&self, url: &str) -> bool {
        url.starts_with(&self.api.file_download_url(""))
    }

    /// Fetch the member count of a chat.
    pub async fn member_count(&self, handle: &str) -> SoftLookup<u32> {
        match self.api.get_chat_member_count(handle).await {
            Ok(count) => SoftLookup::Found(count),
            Err(e) => SoftLookup::Failed(e),
        }
    }

    /// Resolve a bot's avatar.
    ///
    /// Tries the chat photo first, then the first profile photo's largest size.
    pub async fn bot_avatar(&self, chat: &ChatInfo) -> SoftLookup<String> {
        let from_chat_photo = match &chat.photo_file_id {
            Some(file_id) => self.file_url(file_id).await,
            None => SoftLookup::Missing,
        };
        if from_chat_photo.is_found() {
            return from_chat_photo;
        }
        if let SoftLookup::Failed(e) = &from_chat_photo {
            warn!(chat_id = chat.id, error = %e, "Chat photo lookup failed, trying profile photos");
        }

        match u64::try_from(chat.id) {
            Ok(user_id) => self.profile_photo_url(user_id).await,
            Err(_) => SoftLookup::Missing,
        }
    }

    /// Resolve the largest size of a user's most recent profile photo.
    pub async fn profile_photo_url(&self, user_id: u64) -> SoftLookup<String> {
        let photos = match self.api.get_user_profile_photos(user_id, 0, 1).await {
            Ok(photos) => photos,
            Err(e) => return SoftLookup::Failed(e),
        };
        if photos.total_count == 0 {
            return SoftLookup::Missing;
        }
        match photos.photos.first().and_then(|sizes| sizes.last()) {
            Some(largest) => self.file_url(&largest.file_id).await,
            None => SoftLookup::Missing,
        }
    }
}

fn bot_display_name(chat: &ChatInfo) -> Option<String> {
    let first = chat.first_name.as_deref().filter(|s| !s.is_empty())?;
    Some(match chat.last_name.as_deref().filter(|s| !s.is_empty()) {
        Some(last) => format!("{first} {last}"),
        None => first.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telegram::{
        FileInfo, MockTelegramApi, PhotoSizeInfo, ProfilePhotos, StickerInfo, StickerSetInfo,
    };
    use mockall::predicate::eq;

    fn with_download_urls(mock: &mut MockTelegramApi) {
        mock.expect_file_download_url()
            .returning(|path| format!("https://api.telegram.org/file/botTOKEN/{path}"));
    }

    fn chat(chat_type: ChatType, photo: Option<&str>) -> ChatInfo {
        ChatInfo {
            id: 4242,
            chat_type,
            title: Some("Example Channel".to_string()),
            first_name: None,
            last_name: None,
            username: Some("examplechannel".to_string()),
            description: Some("News and more".to_string()),
            photo_file_id: photo.map(ToString::to_string),
        }
    }

    fn target(kind: EntityKind, identifier: &str) -> ClassifiedTarget {
        ClassifiedTarget {
            kind,
            identifier: identifier.to_string(),
        }
    }

    #[tokio::test]
    async fn test_channel_resolves_count_and_avatar() {
        let mut mock = MockTelegramApi::new();
        with_download_urls(&mut mock);
        mock.expect_get_chat()
            .with(eq("@examplechannel"))
            .returning(|_| Ok(chat(ChatType::Channel, Some("photo-big"))));
        mock.expect_get_chat_member_count()
            .with(eq("@examplechannel"))
            .returning(|_| Ok(1500));
        mock.expect_get_file()
            .with(eq("photo-big"))
            .returning(|_| Ok(FileInfo { path: "photos/file_7.jpg".to_string() }));

        let resolver = EntityResolver::new(Arc::new(mock));
        let entity = resolver
            .resolve(&target(EntityKind::ChannelOrGroup, "examplechannel"))
            .await
            .expect("channel should resolve");

        assert_eq!(entity.reported_type, ReportedType::Channel);
        assert_eq!(entity.count, 1500);
        assert_eq!(
            entity.avatar_source_url.as_deref(),
            Some("https://api.telegram.org/file/botTOKEN/photos/file_7.jpg")
        );
    }

    #[tokio::test]
    async fn test_channel_member_count_failure_is_soft() {
        let mut mock = MockTelegramApi::new();
        with_download_urls(&mut mock);
        mock.expect_get_chat()
            .returning(|_| Ok(chat(ChatType::Supergroup, None)));
        mock.expect_get_chat_member_count()
            .returning(|_| Err(TelegramError::Api("Forbidden".to_string())));

        let resolver = EntityResolver::new(Arc::new(mock));
        let entity = resolver
            .resolve(&target(EntityKind::ChannelOrGroup, "examplechannel"))
            .await
            .expect("count failure must not abort");

        assert_eq!(entity.count, 0);
        assert_eq!(entity.avatar_source_url, None);
        assert_eq!(entity.reported_type, ReportedType::Supergroup);
    }

    #[tokio::test]
    async fn test_private_chat_skips_member_count() {
        let mut mock = MockTelegramApi::new();
        mock.expect_get_chat()
            .returning(|_| Ok(chat(ChatType::Private, None)));
        mock.expect_get_chat_member_count().never();

        let resolver = EntityResolver::new(Arc::new(mock));
        let entity = resolver
            .resolve(&target(EntityKind::ChannelOrGroup, "someone"))
            .await
            .expect("private chat should resolve");
        assert_eq!(entity.count, 0);
    }

    #[tokio::test]
    async fn test_channel_not_found_propagates() {
        let mut mock = MockTelegramApi::new();
        mock.expect_get_chat()
            .returning(|_| Err(TelegramError::NotFound("chat not found".to_string())));

        let resolver = EntityResolver::new(Arc::new(mock));
        let err = resolver
            .resolve(&target(EntityKind::ChannelOrGroup, "ghost"))
            .await
            .expect_err("missing chat must fail");
        assert!(matches!(err, ResolveError::EntityNotFound(_)));
    }

    #[tokio::test]
    async fn test_bot_lookup_failure_degrades() {
        let mut mock = MockTelegramApi::new();
        mock.expect_get_chat()
            .returning(|_| Err(TelegramError::Network("connection reset".to_string())));

        let resolver = EntityResolver::new(Arc::new(mock));
        let entity = resolver
            .resolve(&target(EntityKind::Bot, "quiz_bot"))
            .await
            .expect("bot resolution never fails");

        assert_eq!(entity.title, "quiz_bot");
        assert_eq!(entity.description, "");
        assert_eq!(entity.avatar_source_url, None);
        assert_eq!(entity.count, 0);
        assert_eq!(entity.reported_type, ReportedType::Bot);
    }

    #[tokio::test]
    async fn test_bot_avatar_falls_back_to_profile_photos() {
        let mut mock = MockTelegramApi::new();
        with_download_urls(&mut mock);
        mock.expect_get_chat().returning(|_| {
            Ok(ChatInfo {
                id: 777,
                chat_type: ChatType::Private,
                title: None,
                first_name: Some("Quiz".to_string()),
                last_name: Some("Bot".to_string()),
                username: Some("quiz_bot".to_string()),
                description: None,
                photo_file_id: Some("broken".to_string()),
            })
        });
        mock.expect_get_file()
            .with(eq("broken"))
            .returning(|_| Err(TelegramError::NotFound("wrong file_id".to_string())));
        mock.expect_get_user_profile_photos()
            .with(eq(777u64), eq(0u32), eq(1u8))
            .returning(|_, _, _| {
                Ok(ProfilePhotos {
                    total_count: 3,
                    photos: vec![vec![
                        PhotoSizeInfo { file_id: "small".to_string(), width: 160, height: 160 },
                        PhotoSizeInfo { file_id: "large".to_string(), width: 640, height: 640 },
                    ]],
                })
            });
        mock.expect_get_file()
            .with(eq("large"))
            .returning(|_| Ok(FileInfo { path: "profile_photos/large.jpg".to_string() }));

        let resolver = EntityResolver::new(Arc::new(mock));
        let entity = resolver
            .resolve(&target(EntityKind::Bot, "quiz_bot"))
            .await
            .expect("bot resolves");

        assert_eq!(entity.title, "Quiz Bot");
        assert_eq!(entity.description, "quiz_bot");
        assert_eq!(
            entity.avatar_source_url.as_deref(),
            Some("https://api.telegram.org/file/botTOKEN/profile_photos/large.jpg")
        );
    }

    #[tokio::test]
    async fn test_bot_without_any_photo() {
        let mut mock = MockTelegramApi::new();
        mock.expect_get_user_profile_photos()
            .returning(|_, _, _| Ok(ProfilePhotos::default()));

        let resolver = EntityResolver::new(Arc::new(mock));
        let lookup = resolver.bot_avatar(&chat(ChatType::Private, None)).await;
        assert_eq!(lookup, SoftLookup::Missing);
    }

    #[tokio::test]
    async fn test_sticker_pack_preview_failure_is_soft() {
        let mut mock = MockTelegramApi::new();
        mock.expect_get_sticker_set().with(eq("funpack")).returning(|_| {
            Ok(StickerSetInfo {
                name: "funpack".to_string(),
                title: "Fun Pack".to_string(),
                stickers: vec![
                    StickerInfo { file_id: "s1".to_string(), is_animated: false, is_video: false },
                    StickerInfo { file_id: "s2".to_string(), is_animated: true, is_video: false },
                ],
            })
        });
        mock.expect_get_file()
            .returning(|_| Err(TelegramError::Network("timeout".to_string())));

        let resolver = EntityResolver::new(Arc::new(mock));
        let entity = resolver
            .resolve(&target(EntityKind::StickerPack, "funpack"))
            .await
            .expect("pack resolves without preview");

        assert_eq!(entity.count, 2);
        assert_eq!(entity.avatar_source_url, None);
        assert_eq!(entity.reported_type, ReportedType::Sticker);
        let set = entity.sticker_set.expect("sticker set present");
        assert_eq!(set.stickers.len(), 2);
        assert!(set.stickers[1].is_animated);
    }

    #[tokio::test]
    async fn test_sticker_pack_lookup_failure_propagates() {
        let mut mock = MockTelegramApi::new();
        mock.expect_get_sticker_set()
            .returning(|_| Err(TelegramError::Api("Unauthorized".to_string())));

        let resolver = EntityResolver::new(Arc::new(mock));
        let err = resolver
            .resolve(&target(EntityKind::StickerPack, "funpack"))
            .await
            .expect_err("pack lookup failure aborts");
        assert!(matches!(err, ResolveError::Upstream(_)));
    }
}
