use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    #[error("Serenity error: {0}")]
    Serenity(Box<poise::serenity_prelude::Error>),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Chat API error ({status}): {message}")]
    ChatApi {
        status: reqwest::StatusCode,
        message: String,
    },

    #[error("Chat response error: {0}")]
    ChatResponse(String),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    #[error("Invalid model: {0}")]
    InvalidModel(String),

    #[error("Graph step limit exceeded")]
    GraphStepLimit,
}

impl From<poise::serenity_prelude::Error> for BotError {
    fn from(err: poise::serenity_prelude::Error) -> Self {
        BotError::Serenity(Box::new(err))
    }
}

impl BotError {
    /// Returns a user-friendly error message suitable for displaying in Discord
    pub fn user_message(&self) -> String {
        match self {
            BotError::Serenity(_) => {
                "抱歉，与 Discord 通信时出现问题，请稍后再试。".to_string()
            }
            BotError::Config(_) | BotError::EnvVar(_) => {
                "抱歉，机器人配置有误，请联系管理员。".to_string()
            }
            BotError::ChatApi { status, .. } => match *status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    "抱歉，AI 服务认证失败，请联系管理员。".to_string()
                }
                StatusCode::TOO_MANY_REQUESTS => "抱歉，请求过于频繁，请稍后再试。".to_string(),
                status if status.is_server_error() => {
                    "抱歉，AI 服务暂时不可用，请稍后再试。".to_string()
                }
                _ => "抱歉，请求 AI 服务时出现问题。".to_string(),
            },
            BotError::ChatResponse(_) | BotError::Json(_) => {
                "抱歉，AI 服务返回了无法识别的结果。".to_string()
            }
            BotError::Reqwest(_) => "抱歉，网络出现问题，请稍后再试。".to_string(),
            BotError::Io(_) => "抱歉，读写本地文件时出现问题。".to_string(),
            BotError::ToolExecution(_) => "抱歉，调用工具时出现问题。".to_string(),
            BotError::InvalidModel(name) => format!("无效的模型名称: {name}"),
            BotError::GraphStepLimit => "抱歉，处理步骤过多，请换个说法再试。".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_has_dedicated_message() {
        let err = BotError::ChatApi {
            status: StatusCode::TOO_MANY_REQUESTS,
            message: "slow down".to_string(),
        };
        assert!(err.user_message().contains("频繁"));
    }

    #[test]
    fn display_includes_detail() {
        let err = BotError::ToolExecution("boom".to_string());
        assert_eq!(err.to_string(), "Tool execution error: boom");
    }
}
