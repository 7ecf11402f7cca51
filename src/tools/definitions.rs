//! Tool definitions for the chat completions tool calling API.

use serde_json::json;

use crate::llm::{FunctionDefinition, Tool};

/// Returns the tool definitions advertised to the model.
pub fn get_tool_definitions() -> Vec<Tool> {
    vec![
        Tool {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: "analyze_image".to_string(),
                description: "Analyze image content and return AI recognition results. \
                    Use it for any image URL the user sends."
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "A natural language query for image analysis, e.g. \"图中有什么\", \"详细描述图片\""
                        },
                        "image_input": {
                            "type": "string",
                            "description": "Image source: an http(s) URL, a base64 encoded image, or a data:image/ base64 URL"
                        }
                    },
                    "required": ["query", "image_input"]
                }),
            },
        },
        Tool {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: "get_time".to_string(),
                description: "获取指定时区当前时间，并根据指定的格式返回时间字符串。".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "timezone": {
                            "type": "string",
                            "description": "IANA timezone name, e.g. \"Asia/Shanghai\", \"America/New_York\". Default: Asia/Shanghai"
                        },
                        "format": {
                            "type": "string",
                            "description": "strftime format string. Default: %Y-%m-%d %H:%M:%S"
                        }
                    },
                    "required": []
                }),
            },
        },
    ]
}
