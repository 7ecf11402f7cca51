use std::env;
use std::path::PathBuf;

use log::{debug, error, info};

use crate::error::{BotError, Result};
use crate::types::TriggerMode;

const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_SYSTEM_PROMPT: &str = "你是一个群聊机器人。回答要简洁。\
    需要时可以调用工具查看图片或查询时间。";
const DEFAULT_IMAGE_FOLDER: &str = "data/images";
const DEFAULT_MAX_SESSIONS: usize = 100;

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub command_prefix: String,
    pub admin_user_ids: Vec<u64>,
    pub llm: LlmConfig,
    pub image: ImageAnalysisConfig,
    pub chat: ChatSettings,
}

/// Connection settings for the OpenAI-compatible chat endpoint.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub system_prompt: String,
}

/// Settings for the `analyze_image` tool.
#[derive(Debug, Clone)]
pub struct ImageAnalysisConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub folder: PathBuf,
}

/// Chat behaviour that admin commands can change at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSettings {
    pub trigger_modes: Vec<TriggerMode>,
    pub trigger_words: Vec<String>,
    pub enable_group: bool,
    pub enable_private: bool,
    pub max_sessions: usize,
    pub group_chat_isolation: bool,
    pub empty_message_replies: Vec<String>,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            trigger_modes: vec![TriggerMode::Mention],
            trigger_words: Vec::new(),
            enable_group: true,
            enable_private: true,
            max_sessions: DEFAULT_MAX_SESSIONS,
            group_chat_isolation: true,
            empty_message_replies: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        debug!("Loading configuration from environment");
        dotenvy::dotenv().ok();

        let discord_token = required("DISCORD_TOKEN")?;
        let command_prefix = optional("COMMAND_PREFIX").unwrap_or_else(|| "/".to_string());
        let admin_user_ids = parse_user_ids(&optional("ADMIN_USER_IDS").unwrap_or_default())?;

        let llm = LlmConfig {
            api_key: required("LLM_API_KEY")?,
            base_url: optional("LLM_BASE_URL").unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
            model: required("LLM_MODEL")?,
            system_prompt: optional("SYSTEM_PROMPT")
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        };

        let image = ImageAnalysisConfig {
            api_key: optional("IMAGE_API_KEY").unwrap_or_else(|| llm.api_key.clone()),
            base_url: optional("IMAGE_BASE_URL").unwrap_or_else(|| llm.base_url.clone()),
            model: optional("IMAGE_MODEL").unwrap_or_else(|| llm.model.clone()),
            folder: optional("IMAGE_FOLDER")
                .map_or_else(|| PathBuf::from(DEFAULT_IMAGE_FOLDER), PathBuf::from),
        };

        let defaults = ChatSettings::default();
        let chat = ChatSettings {
            trigger_modes: match optional("TRIGGER_MODE") {
                Some(raw) => parse_trigger_modes(&raw)?,
                None => defaults.trigger_modes,
            },
            trigger_words: parse_list(&optional("TRIGGER_WORDS").unwrap_or_default(), ','),
            enable_group: bool_var("ENABLE_GROUP", defaults.enable_group)?,
            enable_private: bool_var("ENABLE_PRIVATE", defaults.enable_private)?,
            max_sessions: match optional("MAX_SESSIONS") {
                Some(raw) => parse_max_sessions(&raw)?,
                None => defaults.max_sessions,
            },
            group_chat_isolation: bool_var("GROUP_CHAT_ISOLATION", defaults.group_chat_isolation)?,
            empty_message_replies: parse_list(
                &optional("EMPTY_MESSAGE_REPLIES").unwrap_or_default(),
                '|',
            ),
        };

        info!("Configuration loaded successfully");
        debug!("Discord token length: {} characters", discord_token.len());
        debug!("LLM API key length: {} characters", llm.api_key.len());
        debug!("LLM endpoint: {} (model {})", llm.base_url, llm.model);
        debug!("Image analysis model: {}", image.model);
        debug!("Chat settings: {chat:?}");

        Ok(Self {
            discord_token,
            command_prefix,
            admin_user_ids,
            llm,
            image,
            chat,
        })
    }
}

fn required(name: &str) -> Result<String> {
    env::var(name).map_err(|e| {
        error!("Failed to load {name} from environment: {e}");
        e.into()
    })
}

fn optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn bool_var(name: &str, default: bool) -> Result<bool> {
    optional(name).map_or(Ok(default), |raw| parse_bool(name, &raw))
}

/// Splits a separated list, trimming entries and dropping empty ones.
pub fn parse_list(raw: &str, separator: char) -> Vec<String> {
    raw.split(separator)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(BotError::Config(format!(
            "{name} must be true or false, got '{other}'"
        ))),
    }
}

pub fn parse_trigger_modes(raw: &str) -> Result<Vec<TriggerMode>> {
    parse_list(raw, ',')
        .iter()
        .map(|mode| {
            mode.parse::<TriggerMode>()
                .map_err(|_| BotError::Config(format!("Unknown trigger mode '{mode}'")))
        })
        .collect()
}

fn parse_max_sessions(raw: &str) -> Result<usize> {
    match raw.trim().parse::<usize>() {
        Ok(0) | Err(_) => Err(BotError::Config(format!(
            "MAX_SESSIONS must be a positive integer, got '{raw}'"
        ))),
        Ok(value) => Ok(value),
    }
}

fn parse_user_ids(raw: &str) -> Result<Vec<u64>> {
    parse_list(raw, ',')
        .iter()
        .map(|id| {
            id.parse::<u64>()
                .map_err(|_| BotError::Config(format!("Invalid user ID '{id}' in ADMIN_USER_IDS")))
        })
        .collect()
}
