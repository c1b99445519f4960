//! `teloxide`-backed implementation of [`TelegramApi`].

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{FileId, Recipient, UserId};
use teloxide::RequestError;
use tracing::debug;

use super::{
    file_download_url, ChatInfo, ChatType, FileInfo, PhotoSizeInfo, ProfilePhotos, StickerInfo,
    StickerSetInfo, TelegramApi, TelegramError,
};
use crate::config::CatalogSettings;
use crate::utils::retry_transport_operation;

/// Telegram Bot API client built on `teloxide::Bot`.
///
/// Transient transport failures are retried with exponential backoff; API-level
/// errors are returned immediately.
#[derive(Clone)]
pub struct TeloxideApi {
    bot: Bot,
    api_url: String,
    token: String,
}

impl TeloxideApi {
    /// Create a client from settings
    #[must_use]
    pub fn new(settings: &CatalogSettings) -> Self {
        Self {
            bot: Bot::new(settings.telegram_token.clone()),
            api_url: settings.telegram_api_url.clone(),
            token: settings.telegram_token.clone(),
        }
    }
}

fn recipient(handle: &str) -> Recipient {
    match handle.parse::<i64>() {
        Ok(id) => Recipient::Id(ChatId(id)),
        Err(_) => Recipient::ChannelUsername(super::chat_handle(handle)),
    }
}

/// Map a Bot API error description onto the catalog's error classes.
///
/// Telegram reports missing entities as `Bad Request` descriptions such as
/// "chat not found" or "STICKERSET_INVALID"; token problems look similar but
/// are upstream failures.
pub(crate) fn classify_api_message(message: &str) -> TelegramError {
    let lower = message.to_lowercase();
    if lower.contains("token") || lower.contains("unauthorized") {
        return TelegramError::Api(message.to_string());
    }
    if lower.contains("not found")
        || lower.contains("stickerset_invalid")
        || lower.contains("username_invalid")
        || lower.contains("invalid user_id")
        || lower.contains("wrong file")
    {
        return TelegramError::NotFound(message.to_string());
    }
    TelegramError::Api(message.to_string())
}

fn map_request_error(err: RequestError) -> TelegramError {
    match &err {
        RequestError::Api(api) => classify_api_message(&api.to_string()),
        RequestError::Network(_) | RequestError::Io(_) => TelegramError::Network(err.to_string()),
        RequestError::RetryAfter(delay) => {
            TelegramError::Api(format!("Rate limited, retry after {}s", delay.seconds()))
        }
        _ => TelegramError::Api(err.to_string()),
    }
}

#[async_trait]
impl TelegramApi for TeloxideApi {
    async fn get_chat(&self, handle: &str) -> Result<ChatInfo, TelegramError> {
        let target = recipient(handle);
        let chat = retry_transport_operation(
            || async {
                self.bot
                    .get_chat(target.clone())
                    .await
                    .map_err(map_request_error)
            },
            TelegramError::is_transient,
        )
        .await?;

        let chat_type = if chat.is_channel() {
            ChatType::Channel
        } else if chat.is_supergroup() {
            ChatType::Supergroup
        } else if chat.is_group() {
            ChatType::Group
        } else {
            ChatType::Private
        };
        debug!(handle, chat_type = chat_type.as_str(), "Fetched chat");

        Ok(ChatInfo {
            id: chat.id.0,
            chat_type,
            title: chat.title().map(ToString::to_string),
            first_name: chat.first_name().map(ToString::to_string),
            last_name: chat.last_name().map(ToString::to_string),
            username: chat.username().map(ToString::to_string),
            description: chat.description().map(ToString::to_string),
            photo_file_id: chat.photo.as_ref().map(|p| p.big_file_id.to_string()),
        })
    }

    async fn get_chat_member_count(&self, handle: &str) -> Result<u32, TelegramError> {
        let target = recipient(handle);
        retry_transport_operation(
            || async {
                self.bot
                    .get_chat_member_count(target.clone())
                    .await
                    .map_err(map_request_error)
            },
            TelegramError::is_transient,
        )
        .await
    }

    async fn get_sticker_set(&self, name: &str) -> Result<StickerSetInfo, TelegramError> {
        let set = retry_transport_operation(
            || async {
                self.bot
                    .get_sticker_set(name.to_string())
                    .await
                    .map_err(map_request_error)
            },
            TelegramError::is_transient,
        )
        .await?;

        Ok(StickerSetInfo {
            name: set.name.clone(),
            title: set.title.clone(),
            stickers: set
                .stickers
                .iter()
                .map(|s| StickerInfo {
                    file_id: s.file.id.to_string(),
                    is_animated: s.is_animated(),
                    is_video: s.is_video(),
                })
                .collect(),
        })
    }

    async fn get_file(&self, file_id: &str) -> Result<FileInfo, TelegramError> {
        let file = retry_transport_operation(
            || async {
                self.bot
                    .get_file(FileId(file_id.to_string()))
                    .await
                    .map_err(map_request_error)
            },
            TelegramError::is_transient,
        )
        .await?;

        Ok(FileInfo { path: file.path })
    }

    async fn get_user_profile_photos(
        &self,
        user_id: u64,
        offset: u32,
        limit: u8,
    ) -> Result<ProfilePhotos, TelegramError> {
        let photos = retry_transport_operation(
            || async {
                self.bot
                    .get_user_profile_photos(UserId(user_id))
                    .offset(offset)
                    .limit(limit)
                    .await
                    .map_err(map_request_error)
            },
            TelegramError::is_transient,
        )
        .await?;

        Ok(ProfilePhotos {
            total_count: photos.total_count,
            photos: photos
                .photos
                .iter()
                .map(|sizes| {
                    sizes
                        .iter()
                        .map(|size| PhotoSizeInfo {
                            file_id: size.file.id.to_string(),
                            width: size.width,
                            height: size.height,
                        })
                        .collect()
                })
                .collect(),
        })
    }

    fn file_download_url(&self, file_path: &str) -> String {
        file_download_url(&self.api_url, &self.token, file_path)
    }
}
