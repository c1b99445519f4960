//! Testing helpers and mock utilities.
//!
//! Provides convenient constructors for mocked Telegram and CDN clients.

use crate::cdn::{MockCdnClient, UploadedAsset};
use crate::telegram::{FileInfo, MockTelegramApi, TelegramError};

/// Base of the transient file URLs produced by [`mock_telegram_files`]
pub const MOCK_FILE_BASE: &str = "https://api.telegram.org/file/botT";

/// Base of the permanent URLs produced by [`mock_cdn_echo`]
pub const MOCK_CDN_BASE: &str = "https://cdn.example.com";

/// Create a mock CDN whose uploads always succeed.
///
/// The stored URL keeps the source's file name:
/// `{MOCK_CDN_BASE}/{resource_type}/upload/{folder}/{file name}`.
///
/// # Example
///
/// ```rust,ignore
/// use teledex_core::testing::mock_cdn_echo;
///
/// let cdn = mock_cdn_echo();
/// // Add destroy / batch_destroy expectations as needed...
/// ```
#[must_use]
pub fn mock_cdn_echo() -> MockCdnClient {
    let mut mock = MockCdnClient::new();
    mock.expect_upload().returning(|source, options| {
        let file = source.rsplit('/').next().unwrap_or_default();
        Ok(UploadedAsset {
            public_id: format!("{}/{file}", options.folder),
            secure_url: format!(
                "{MOCK_CDN_BASE}/{}/upload/{}/{file}",
                options.resource_type.as_str(),
                options.folder
            ),
        })
    });
    mock
}

/// Create a mock Telegram client that only serves files.
///
/// `get_file(id)` resolves to `stickers/{id}.webp`, except for the id
/// `missing`, which fails with [`TelegramError::NotFound`].
#[must_use]
pub fn mock_telegram_files() -> MockTelegramApi {
    let mut mock = MockTelegramApi::new();
    mock.expect_file_download_url()
        .returning(|path| format!("{MOCK_FILE_BASE}/{path}"));
    mock.expect_get_file().returning(|file_id| {
        if file_id == "missing" {
            Err(TelegramError::NotFound("wrong file_id".to_string()))
        } else {
            Ok(FileInfo {
                path: format!("stickers/{file_id}.webp"),
            })
        }
    });
    mock
}
