//! Decides whether an inbound message starts or continues a dialogue.

use crate::config::ChatSettings;
use crate::types::TriggerMode;

use super::segments::InboundMessage;

/// Returns true when `message` should be answered under `settings`.
///
/// Rules are checked in a fixed order (mention, keyword, prefix) and the
/// first satisfied one wins. With no mode configured only messages addressed
/// to the bot match.
pub fn should_respond(message: &InboundMessage, settings: &ChatSettings) -> bool {
    let modes = &settings.trigger_modes;
    if modes.is_empty() {
        return message.to_me;
    }

    if modes.contains(&TriggerMode::Mention) && message.to_me {
        return true;
    }

    let text = message.raw_text();
    let mut words = settings.trigger_words.iter().filter(|word| !word.is_empty());

    if modes.contains(&TriggerMode::Keyword)
        && words.clone().any(|word| text.contains(word.as_str()))
    {
        return true;
    }

    modes.contains(&TriggerMode::Prefix)
        && words.any(|word| text.starts_with(word.as_str()))
}
