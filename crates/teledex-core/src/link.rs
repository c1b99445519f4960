//! Telegram link classification
//!
//! Turns anything a user might paste (`https://t.me/name`, `@name`,
//! `t.me/addstickers/pack`, `https://t.me/some_bot?start=x`) into an entity
//! kind and a bare identifier.

use serde::{Deserialize, Serialize};

use crate::resolver::ResolveError;
use crate::utils::strip_query;

/// Path marker of sticker set links
pub const STICKER_PACK_MARKER: &str = "/addstickers/";

/// What a link points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    /// Sticker set (`/addstickers/<name>`)
    StickerPack,
    /// Bot account (username ends with `bot`)
    Bot,
    /// Channel, group or supergroup
    ChannelOrGroup,
}

/// Output of [`classify`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedTarget {
    /// Entity kind
    pub kind: EntityKind,
    /// Username or sticker set name, never empty
    pub identifier: String,
}

/// Classify a Telegram link or handle.
///
/// Sticker-pack detection wins over bot detection, which wins over the
/// channel/group default.
///
/// # Errors
///
/// Returns [`ResolveError::InvalidLink`] if no identifier can be extracted.
pub fn classify(link: &str) -> Result<ClassifiedTarget, ResolveError> {
    let trimmed = link.trim();
    let normalized = trimmed.strip_prefix('@').unwrap_or(trimmed);

    let (kind, identifier) = if let Some((_, rest)) = normalized.split_once(STICKER_PACK_MARKER) {
        let name = strip_query(rest).split('/').next().unwrap_or_default();
        (EntityKind::StickerPack, name)
    } else {
        let segment = strip_query(normalized.rsplit('/').next().unwrap_or(normalized));
        if segment.to_lowercase().ends_with("bot") {
            (EntityKind::Bot, segment)
        } else {
            (EntityKind::ChannelOrGroup, segment)
        }
    };

    if identifier.is_empty() {
        return Err(ResolveError::InvalidLink(link.to_string()));
    }

    Ok(ClassifiedTarget {
        kind,
        identifier: identifier.to_string(),
    })
}
