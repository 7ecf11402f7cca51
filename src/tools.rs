//! Tools the model can call through the chat completions tool calling API

mod analyze_image;
mod definitions;
mod executor;
mod get_time;

pub use definitions::get_tool_definitions;
pub use executor::{ToolContext, ToolExecutor};
