//! Tool executor for dispatching tool calls.

use log::{debug, warn};

use crate::config::ImageAnalysisConfig;
use crate::error::{BotError, Result};

use super::analyze_image::analyze_image;
use super::get_time::get_time;

/// Shared resources the tools need
pub struct ToolContext {
    pub http: reqwest::Client,
    pub image: ImageAnalysisConfig,
}

/// Executor for the tools the model can call
pub struct ToolExecutor {
    ctx: ToolContext,
}

impl ToolExecutor {
    pub fn new(image: ImageAnalysisConfig) -> Self {
        Self {
            ctx: ToolContext {
                http: reqwest::Client::new(),
                image,
            },
        }
    }

    /// Execute a tool by name with the given JSON arguments
    pub async fn execute(&self, name: &str, arguments: &str) -> Result<String> {
        debug!("Executing tool '{name}' with args: {arguments}");

        match name {
            "analyze_image" => analyze_image(arguments, &self.ctx).await,
            "get_time" => get_time(arguments),
            _ => {
                warn!("Unknown tool requested: {name}");
                Err(BotError::ToolExecution(format!("Unknown tool: {name}")))
            }
        }
    }
}
