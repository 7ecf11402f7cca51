//! OpenAI-compatible chat completions client and the message types shared with the graph.

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{BotError, Result};
use crate::types::MessageRole;

// Discord's message limit is 2000 characters; replies are chunked, so this
// only bounds runaway generations.
const MAX_TOKENS: u32 = 1024;

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_tokens: u32,
    #[serde(skip_serializing_if = "no_tools")]
    tools: &'a [Tool],
}

fn no_tools(tools: &&[Tool]) -> bool {
    tools.is_empty()
}

// Tool calling structures
#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// A tool call whose arguments could not be parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    MultiPart(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Calls the model attempted with malformed arguments. Never sent upstream.
    #[serde(skip)]
    pub invalid_tool_calls: Vec<InvalidToolCall>,
}

impl Message {
    fn plain(role: MessageRole, text: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(MessageContent::Text(text.into())),
            tool_calls: None,
            tool_call_id: None,
            invalid_tool_calls: Vec::new(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::plain(MessageRole::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::plain(MessageRole::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::plain(MessageRole::Assistant, text)
    }

    pub fn tool_result(tool_call_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::plain(MessageRole::Tool, text)
        }
    }

    /// Text content of the message, joining the text parts of multipart content.
    pub fn text(&self) -> String {
        match &self.content {
            Some(MessageContent::Text(text)) => text.clone(),
            Some(MessageContent::MultiPart(parts)) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
            None => String::new(),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|calls| !calls.is_empty())
    }
}

/// A chat model the orchestration graph can call.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Name of the underlying model.
    fn model_name(&self) -> &str;

    /// Produce the next assistant message for the conversation.
    async fn complete(&self, messages: &[Message], tools: &[Tool]) -> Result<Message>;
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

pub struct ChatCompletionsClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
    model: String,
}

impl ChatCompletionsClient {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            api_key,
            base_url,
            client: reqwest::Client::new(),
            model,
        }
    }

    fn endpoint(&self) -> String {
        completions_url(&self.base_url)
    }
}

/// Builds the `/chat/completions` URL for an API base URL.
pub fn completions_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

#[async_trait]
impl ChatModel for ChatCompletionsClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[Message], tools: &[Tool]) -> Result<Message> {
        debug!(
            "Sending request to {} with {} messages",
            self.model,
            messages.len()
        );

        let request = ChatCompletionRequest {
            model: &self.model,
            messages,
            max_tokens: MAX_TOKENS,
            tools,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response
                .text()
                .await
                .unwrap_or_else(|e| format!("Failed to read error response: {e}"));
            return Err(BotError::ChatApi { status, message });
        }

        let api_response: ChatCompletionResponse = response.json().await?;

        let message = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BotError::ChatResponse("No choices in response".to_string()))?
            .message;

        if message.has_tool_calls() {
            debug!(
                "Received {} tool calls from {}",
                message.tool_calls.as_ref().map_or(0, Vec::len),
                self.model
            );
        } else {
            debug!("Received response from {}", self.model);
        }
        Ok(message)
    }
}
