//! Discord message handler feeding the chat service.

use log::{debug, info, warn};
use poise::serenity_prelude::{Context, Message as SerenityMessage, UserId};

use crate::bot::Data;
use crate::commands::is_command_invocation;
use crate::error::Result;
use crate::media::image_attachment_urls;
use crate::session::ChatScope;

use super::segments::{InboundMessage, Segment, parse_content};

/// Discord's message length limit for standard users.
const DISCORD_MESSAGE_LIMIT: usize = 2000;

/// Main handler for every message the bot can see.
pub async fn handle_message(
    ctx: &Context,
    new_message: &SerenityMessage,
    data: &Data,
) -> Result<()> {
    let bot_user_id = ctx.cache.current_user().id;
    if new_message.author.id == bot_user_id || new_message.author.bot {
        return Ok(());
    }
    if is_command_invocation(&new_message.content, data.command_prefix()) {
        return Ok(());
    }

    let mut inbound = to_inbound(new_message, bot_user_id);
    if !data.chat().triggers(&inbound).await {
        return Ok(());
    }
    if let Some(full) = fetch_referenced(ctx, new_message).await {
        inbound.reply = Some(message_segments(&full));
    }

    info!(
        "Received message from {} in channel {}: {}",
        new_message.author.tag(),
        new_message.channel_id,
        new_message.content
    );

    if let Err(e) = new_message.channel_id.broadcast_typing(&ctx.http).await {
        debug!("Failed to broadcast typing indicator: {e}");
    }

    let Some(reply) = data.chat().respond(&inbound).await else {
        return Ok(());
    };
    send_reply(ctx, new_message, &reply).await
}

/// Segments of a Discord message: text and mentions from the content, then image attachments.
fn message_segments(message: &SerenityMessage) -> Vec<Segment> {
    let mut segments = parse_content(&message.content);
    segments.extend(
        image_attachment_urls(&message.attachments)
            .into_iter()
            .map(|url| Segment::Image { url }),
    );
    segments
}

/// Fetches the full message being replied to; `referenced_message` lacks attachments.
async fn fetch_referenced(ctx: &Context, message: &SerenityMessage) -> Option<SerenityMessage> {
    let partial = message.referenced_message.as_deref()?;
    match ctx.http.get_message(partial.channel_id, partial.id).await {
        Ok(full) => Some(full),
        Err(e) => {
            warn!("Failed to fetch replied-to message: {e}");
            None
        }
    }
}

/// A DM, a mention of the bot, or a reply to one of the bot's messages.
fn is_addressed(
    scope: ChatScope,
    mentions_bot: bool,
    replied_author: Option<UserId>,
    bot_user_id: UserId,
) -> bool {
    scope == ChatScope::Private || mentions_bot || replied_author == Some(bot_user_id)
}

/// Builds the inbound view from the gateway payload alone, without HTTP calls.
///
/// The reply segments come from the partial referenced message until the
/// caller replaces them with the fetched one.
fn to_inbound(message: &SerenityMessage, bot_user_id: UserId) -> InboundMessage {
    let scope = match message.guild_id {
        Some(_) => ChatScope::Group {
            group_id: message.channel_id.get(),
        },
        None => ChatScope::Private,
    };
    let referenced = message.referenced_message.as_deref();

    InboundMessage {
        scope,
        user_id: message.author.id.get(),
        segments: message_segments(message),
        reply: referenced.map(message_segments),
        to_me: is_addressed(
            scope,
            message.mentions_user_id(bot_user_id),
            referenced.map(|replied| replied.author.id),
            bot_user_id,
        ),
    }
}

/// Splits `text` into pieces of at most `limit` characters.
fn split_message(text: &str, limit: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(limit.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

async fn send_reply(ctx: &Context, new_message: &SerenityMessage, text: &str) -> Result<()> {
    let mut chunks = split_message(text, DISCORD_MESSAGE_LIMIT).into_iter();
    let Some(first) = chunks.next() else {
        warn!("No response content generated");
        return Ok(());
    };

    new_message.reply(&ctx.http, &first).await?;
    for chunk in chunks {
        new_message.channel_id.say(&ctx.http, chunk).await?;
    }

    info!(
        "Replied to {} in channel {}: {}",
        new_message.author.tag(),
        new_message.channel_id,
        text
    );
    Ok(())
}
