#![deny(missing_docs)]
//! Teledex core library.
//!
//! Telegram link resolution, metadata normalization, asset migration to
//! object storage, and the catalog workflows built on top of them.

/// Payload assembly and the end-to-end fetch pipeline.
pub mod assembler;
/// Catalog records, stores and moderation workflows.
pub mod catalog;
/// Object storage (CDN) client.
pub mod cdn;
/// Configuration management.
pub mod config;
/// Telegram link classification.
pub mod link;
/// Moving transient Telegram files into permanent storage.
pub mod migrator;
/// Keyword-based NSFW heuristic.
pub mod nsfw;
/// Entity resolution against the Telegram Bot API.
pub mod resolver;
/// Telegram Bot API client abstraction.
pub mod telegram;
/// Utility functions.
pub mod utils;

#[cfg(test)]
pub mod testing;
