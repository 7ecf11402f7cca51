//! Reply extraction from a finished graph run.

use std::fmt::Write;

use crate::llm::Message;
use crate::types::MessageRole;

pub const NO_ANSWER: &str = "对不起，我现在无法回答。";
pub const NOT_UNDERSTOOD: &str = "对不起，我没有理解您的问题。";
pub const TOOL_FAILURE_PREFIX: &str = "工具调用失败: ";

/// Picks the text to send back from the graph's final message list.
pub fn extract_reply(messages: &[Message]) -> String {
    let Some(last) = messages.last() else {
        return NO_ANSWER.to_string();
    };

    match last.role {
        MessageRole::Assistant => {
            if let Some(invalid) = last.invalid_tool_calls.first() {
                return format!("{TOOL_FAILURE_PREFIX}{}", invalid.error);
            }
            let text = last.text();
            let text = text.trim();
            if text.is_empty() {
                NOT_UNDERSTOOD.to_string()
            } else {
                text.to_string()
            }
        }
        MessageRole::Tool if last.content.is_some() => {
            let text = last.text();
            if text.is_empty() {
                NOT_UNDERSTOOD.to_string()
            } else {
                text
            }
        }
        _ => NOT_UNDERSTOOD.to_string(),
    }
}

/// Renders a transcript for debug logging.
pub fn format_transcript(messages: &[Message]) -> String {
    let mut out = String::new();
    for message in messages {
        match message.role {
            MessageRole::System => {
                let _ = writeln!(out, "SystemMessage: {}", message.text());
            }
            MessageRole::User => {
                let _ = writeln!(out, "HumanMessage: {}", message.text());
            }
            MessageRole::Assistant => {
                let _ = writeln!(out, "AIMessage: {}", message.text());
                for call in message.tool_calls.iter().flatten() {
                    let _ = writeln!(out, "  Tool Name: {}", call.function.name);
                    let _ = writeln!(out, "  Tool Arguments: {}", call.function.arguments);
                }
                for invalid in &message.invalid_tool_calls {
                    let _ = writeln!(
                        out,
                        "  Invalid Tool Call: {} ({})",
                        invalid.name, invalid.error
                    );
                }
            }
            MessageRole::Tool => {
                let _ = writeln!(
                    out,
                    "ToolMessage: call {} content: {}",
                    message.tool_call_id.as_deref().unwrap_or("?"),
                    message.text()
                );
            }
        }
    }
    out
}
