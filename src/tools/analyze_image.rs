//! Image analysis tool backed by an image-capable chat completions endpoint.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{BotError, Result};
use crate::llm::{ContentPart, ImageUrl, completions_url};
use crate::media::image_source_to_data_url;

use super::executor::ToolContext;

/// Arguments for the `analyze_image` tool
#[derive(Debug, Deserialize)]
struct AnalyzeImageArgs {
    query: String,
    image_input: String,
}

/// Request payload for image analysis
#[derive(Debug, Serialize)]
struct AnalyzeImageRequest<'a> {
    model: &'a str,
    messages: Vec<RequestMessage>,
}

/// Message in the request
#[derive(Debug, Serialize)]
struct RequestMessage {
    role: &'static str,
    content: Vec<ContentPart>,
}

/// Analyze an image and return the provider's raw completion response.
pub async fn analyze_image(arguments: &str, tool_ctx: &ToolContext) -> Result<String> {
    let args: AnalyzeImageArgs = serde_json::from_str(arguments)?;
    debug!("Image analysis with query: '{}'", args.query);

    let config = &tool_ctx.image;
    let image_url =
        image_source_to_data_url(&tool_ctx.http, &args.image_input, &config.folder).await?;

    let request = AnalyzeImageRequest {
        model: &config.model,
        messages: vec![RequestMessage {
            role: "user",
            content: vec![
                ContentPart::Text { text: args.query },
                ContentPart::ImageUrl {
                    image_url: ImageUrl { url: image_url },
                },
            ],
        }],
    };

    let response = tool_ctx
        .http
        .post(completions_url(&config.base_url))
        .bearer_auth(&config.api_key)
        .json(&request)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let message = response.text().await?;
        return Err(BotError::ChatApi { status, message });
    }

    let completion = response.text().await?;
    debug!("Image analysis completed ({} bytes)", completion.len());
    Ok(completion)
}
