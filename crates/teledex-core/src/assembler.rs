//! Payload assembly
//!
//! [`assemble`] is pure composition of classifier, resolver and heuristic
//! output. [`MediaFetcher`] runs the whole link → payload pipeline.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::link::{classify, ClassifiedTarget, EntityKind};
use crate::nsfw::is_nsfw;
use crate::resolver::{EntityResolver, ReportedType, ResolveError, ResolvedEntity, StickerSetSummary};

/// Normalized metadata returned by the resolve endpoint.
///
/// `image_url` is still the transient Telegram URL here; it is migrated to
/// permanent storage when the payload is submitted for persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaPayload {
    /// Link as submitted
    pub url: String,
    /// Username or sticker set name
    pub username: String,
    /// Display name
    pub name: String,
    /// Member count, sticker count or 0
    pub member_count: u64,
    /// Transient avatar URL
    pub image_url: Option<String>,
    /// Description
    pub description: String,
    /// `sticker` for packs, otherwise the type reported by Telegram
    #[serde(rename = "type")]
    pub media_type: ReportedType,
    /// NSFW heuristic result
    #[serde(rename = "isNSFW")]
    pub is_nsfw: bool,
    /// Sticker pack containing at least one animated sticker
    pub is_animated_sticker: bool,
    /// Full sticker set for later migration
    pub sticker_set: Option<StickerSetSummary>,
}

/// Compose the normalized payload.
#[must_use]
pub fn assemble(
    link: &str,
    target: &ClassifiedTarget,
    entity: ResolvedEntity,
    nsfw: bool,
) -> MediaPayload {
    let media_type = match target.kind {
        EntityKind::StickerPack => ReportedType::Sticker,
        EntityKind::Bot | EntityKind::ChannelOrGroup => entity.reported_type,
    };
    let is_animated_sticker = target.kind == EntityKind::StickerPack
        && entity
            .sticker_set
            .as_ref()
            .is_some_and(|set| set.stickers.iter().any(|s| s.is_animated));
    let name = if entity.title.is_empty() {
        target.identifier.clone()
    } else {
        entity.title
    };

    MediaPayload {
        url: link.to_string(),
        username: target.identifier.clone(),
        name,
        member_count: entity.count,
        image_url: entity.avatar_source_url,
        description: entity.description,
        media_type,
        is_nsfw: nsfw,
        is_animated_sticker,
        sticker_set: entity.sticker_set,
    }
}

/// Runs classify → resolve → NSFW heuristic → assemble.
#[derive(Clone)]
pub struct MediaFetcher {
    resolver: EntityResolver,
}

impl MediaFetcher {
    /// Create a fetcher on top of a resolver
    #[must_use]
    pub const fn new(resolver: EntityResolver) -> Self {
        Self { resolver }
    }

    /// Resolver used by this fetcher
    #[must_use]
    pub const fn resolver(&self) -> &EntityResolver {
        &self.resolver
    }

    /// Resolve a Telegram link into a normalized payload.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when the link is invalid or the entity cannot be fetched.
    #[instrument(skip(self))]
    pub async fn fetch(&self, link: &str) -> Result<MediaPayload, ResolveError> {
        let target = classify(link)?;
        let entity = self.resolver.resolve(&target).await?;
        let nsfw = is_nsfw(&entity.title, &entity.description, &target.identifier);
        Ok(assemble(link, &target, entity, nsfw))
    }
}
