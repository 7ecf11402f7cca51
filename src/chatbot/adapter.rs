//! Turns an inbound message into graph input.

use rand::prelude::IndexedRandom;

use crate::config::ChatSettings;

use super::segments::{InboundMessage, Segment};

const DEFAULT_EMPTY_REPLY: &str = "您想说什么呢?";

/// Outcome of adapting a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Adapted {
    /// Text to send to the graph
    Prompt(String),
    /// Nothing left after stripping triggers; reply with this instead
    Empty(String),
}

/// Strips mentions and the leading trigger word, then appends image URLs.
pub fn adapt(message: &InboundMessage, settings: &ChatSettings) -> Adapted {
    let content = strip_triggers(&message.segments, &settings.trigger_words);

    if content.trim().is_empty() {
        let reply = settings
            .empty_message_replies
            .choose(&mut rand::rng())
            .map_or(DEFAULT_EMPTY_REPLY, String::as_str);
        return Adapted::Empty(reply.to_string());
    }

    let images = message.image_urls();
    if images.is_empty() {
        Adapted::Prompt(content)
    } else {
        Adapted::Prompt(format!("{content}\n图片URL：{}", images.join("\n")))
    }
}

/// Drops every mention segment and removes the first trigger word the text starts with.
///
/// Keywords elsewhere in the text are kept.
pub fn strip_triggers(segments: &[Segment], trigger_words: &[String]) -> String {
    let text: String = segments
        .iter()
        .filter_map(|segment| match segment {
            Segment::Text(text) => Some(text.as_str()),
            Segment::Image { .. } | Segment::Mention { .. } => None,
        })
        .collect();
    let text = text.trim();

    trigger_words
        .iter()
        .filter(|word| !word.is_empty())
        .find_map(|word| text.strip_prefix(word.as_str()))
        .unwrap_or(text)
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chatbot::segments::parse_content;
    use crate::session::ChatScope;

    fn inbound(content: &str) -> InboundMessage {
        InboundMessage {
            scope: ChatScope::Private,
            user_id: 1,
            segments: parse_content(content),
            reply: None,
            to_me: true,
        }
    }

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn strips_mentions_and_first_prefix() {
        let segments = parse_content("<@9> 小助手 小助手你好 <@10>");
        assert_eq!(
            strip_triggers(&segments, &words(&["bot", "小助手"])),
            "小助手你好"
        );
    }

    #[test]
    fn keeps_keywords_in_the_middle() {
        let segments = parse_content("请问小助手几点了");
        assert_eq!(
            strip_triggers(&segments, &words(&["小助手"])),
            "请问小助手几点了"
        );
    }

    #[test]
    fn appends_image_urls() {
        let mut message = inbound("<@9> 这是什么");
        message.segments.push(Segment::Image {
            url: "https://cdn/a.png".to_string(),
        });
        message.reply = Some(vec![Segment::Image {
            url: "https://cdn/b.png".to_string(),
        }]);

        assert_eq!(
            adapt(&message, &ChatSettings::default()),
            Adapted::Prompt("这是什么\n图片URL：https://cdn/a.png\nhttps://cdn/b.png".to_string())
        );
    }

    #[test]
    fn empty_content_uses_default_reply() {
        let mut message = inbound("<@9>   ");
        message.segments.push(Segment::Image {
            url: "https://cdn/a.png".to_string(),
        });
        assert_eq!(
            adapt(&message, &ChatSettings::default()),
            Adapted::Empty(DEFAULT_EMPTY_REPLY.to_string())
        );
    }

    #[test]
    fn empty_content_picks_configured_reply() {
        let settings = ChatSettings {
            trigger_words: words(&["bot"]),
            empty_message_replies: words(&["嗯？", "在呢"]),
            ..ChatSettings::default()
        };
        match adapt(&inbound("bot"), &settings) {
            Adapted::Empty(reply) => assert!(reply == "嗯？" || reply == "在呢"),
            Adapted::Prompt(text) => panic!("expected empty reply, got prompt {text:?}"),
        }
    }
}
