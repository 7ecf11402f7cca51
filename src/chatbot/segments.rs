//! Platform-neutral view of an inbound chat message.

use std::sync::LazyLock;

use regex::Regex;

use crate::session::ChatScope;

static MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@!?(\d+)>").expect("mention pattern is valid"));

/// One piece of a message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Image { url: String },
    Mention { user_id: u64 },
}

/// A message as seen by the trigger matcher and the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub scope: ChatScope,
    pub user_id: u64,
    pub segments: Vec<Segment>,
    /// Segments of the message this one replies to, if any.
    pub reply: Option<Vec<Segment>>,
    /// Mentions the bot, is a DM, or replies to the bot.
    pub to_me: bool,
}

impl InboundMessage {
    /// The message as raw text, with mentions in `<@id>` form and images omitted.
    pub fn raw_text(&self) -> String {
        let mut text = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(t) => text.push_str(t),
                Segment::Mention { user_id } => {
                    text.push_str("<@");
                    text.push_str(&user_id.to_string());
                    text.push('>');
                }
                Segment::Image { .. } => {}
            }
        }
        text
    }

    /// Image URLs in the message followed by those in the replied-to message.
    pub fn image_urls(&self) -> Vec<String> {
        self.segments
            .iter()
            .chain(self.reply.iter().flatten())
            .filter_map(|segment| match segment {
                Segment::Image { url } => Some(url.clone()),
                Segment::Text(_) | Segment::Mention { .. } => None,
            })
            .collect()
    }
}

/// Splits Discord message content into text and user-mention segments.
pub fn parse_content(content: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut last = 0;

    for captures in MENTION.captures_iter(content) {
        let (Some(whole), Some(id)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        // IDs too large for u64 stay as text
        let Ok(user_id) = id.as_str().parse::<u64>() else {
            continue;
        };
        if whole.start() > last {
            segments.push(Segment::Text(content[last..whole.start()].to_string()));
        }
        segments.push(Segment::Mention { user_id });
        last = whole.end();
    }

    if last < content.len() {
        segments.push(Segment::Text(content[last..].to_string()));
    }
    segments
}
