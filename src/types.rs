//! Common types used throughout the llmchat bot.

use mime::Mime;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Role of a message in the conversation.
///
/// Maps to chat completion API message roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Message from the human user
    User,
    /// Message from the AI assistant
    Assistant,
    /// System prompt or instructions
    System,
    /// Result from a tool execution
    Tool,
}

/// How an inbound message is recognized as addressed to the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(ascii_case_insensitive)]
pub enum TriggerMode {
    /// The message mentions the bot, is a DM, or replies to the bot
    #[strum(serialize = "mention", serialize = "at")]
    Mention,
    /// A trigger word appears anywhere in the message
    #[strum(serialize = "keyword")]
    Keyword,
    /// The message starts with a trigger word
    #[strum(serialize = "prefix")]
    Prefix,
}

/// Returns true when a MIME content type denotes an image.
pub fn is_image_content_type(content_type: &str) -> bool {
    content_type
        .parse::<Mime>()
        .is_ok_and(|mime| mime.type_() == mime::IMAGE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_mode_accepts_at_alias() {
        assert_eq!("at".parse::<TriggerMode>(), Ok(TriggerMode::Mention));
        assert_eq!("Mention".parse::<TriggerMode>(), Ok(TriggerMode::Mention));
        assert_eq!("PREFIX".parse::<TriggerMode>(), Ok(TriggerMode::Prefix));
        assert!("regex".parse::<TriggerMode>().is_err());
    }

    #[test]
    fn detects_image_content_types() {
        assert!(is_image_content_type("image/png"));
        assert!(is_image_content_type("image/webp; charset=binary"));
        assert!(!is_image_content_type("video/mp4"));
        assert!(!is_image_content_type("not a mime"));
    }
}
