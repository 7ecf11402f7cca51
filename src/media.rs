//! Image attachment handling and image source normalization.

use std::path::Path;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD};
use data_url::DataUrl;
use log::{debug, warn};
use poise::serenity_prelude::Attachment;
use reqwest::{Client, header::CONTENT_TYPE};
use url::Url;

use crate::error::{BotError, Result};
use crate::types::is_image_content_type;

/// File the most recent download is stored in, inside the image folder.
pub const DOWNLOAD_FILE_NAME: &str = "downloaded_image.jpg";

const FALLBACK_IMAGE_MIME: &str = "image/jpeg";
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Check if an attachment is an image
#[must_use]
pub fn is_image_attachment(attachment: &Attachment) -> bool {
    attachment
        .content_type
        .as_deref()
        .is_some_and(is_image_content_type)
}

/// URLs of the image attachments, in message order
pub fn image_attachment_urls(attachments: &[Attachment]) -> Vec<String> {
    attachments
        .iter()
        .filter(|attachment| is_image_attachment(attachment))
        .map(|attachment| {
            debug!("Found image attachment: {}", attachment.filename);
            attachment.url.clone()
        })
        .collect()
}

/// Normalizes an image source into a data URL.
///
/// `http(s)` sources are downloaded into `folder`; `data:image/` and
/// `data:application/` URLs are validated and passed through; anything else
/// is taken as raw base64 JPEG data.
pub async fn image_source_to_data_url(
    client: &Client,
    source: &str,
    folder: &Path,
) -> Result<String> {
    let source = source.trim();
    if source.starts_with("http://") || source.starts_with("https://") {
        return download_as_data_url(client, source, folder).await;
    }

    if source.starts_with("data:image/") || source.starts_with("data:application/") {
        DataUrl::process(source)
            .map_err(|e| BotError::ToolExecution(format!("Invalid data URL: {e:?}")))?;
        return Ok(source.to_string());
    }

    Ok(format!("data:{FALLBACK_IMAGE_MIME};base64,{source}"))
}

/// Download an image into `folder` and encode it as a base64 data URL
async fn download_as_data_url(client: &Client, url: &str, folder: &Path) -> Result<String> {
    let parsed = Url::parse(url)
        .map_err(|e| BotError::ToolExecution(format!("Invalid image URL '{url}': {e}")))?;

    debug!("Downloading image from {parsed}");
    let response = client
        .get(parsed.clone())
        .timeout(DOWNLOAD_TIMEOUT)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| {
            warn!("Image download failed: {e}");
            e
        })?;

    let header_mime = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .filter(|value| is_image_content_type(value))
        .map(|value| value.split(';').next().unwrap_or(value).trim().to_string());
    let bytes = response.bytes().await?;

    tokio::fs::create_dir_all(folder).await?;
    let file_path = folder.join(DOWNLOAD_FILE_NAME);
    tokio::fs::write(&file_path, &bytes).await?;
    let stored = tokio::fs::read(&file_path).await?;
    debug!("Stored {} bytes at {}", stored.len(), file_path.display());

    let mime = header_mime.unwrap_or_else(|| guess_image_mime(&parsed));
    Ok(format!("data:{mime};base64,{}", STANDARD.encode(&stored)))
}

/// Guess an image MIME type from the URL path, defaulting to JPEG
fn guess_image_mime(url: &Url) -> String {
    mime_guess::from_path(url.path())
        .first()
        .filter(|mime| mime.type_() == mime::IMAGE)
        .map_or_else(
            || FALLBACK_IMAGE_MIME.to_string(),
            |mime| mime.essence_str().to_string(),
        )
}
