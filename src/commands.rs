//! Owner-only `chat` commands for runtime configuration.

use log::{error, info};

use crate::bot::Data;
use crate::error::{BotError, Result};
use crate::session::ChatScope;

/// Context type for chat commands.
type Context<'a> = poise::Context<'a, Data, BotError>;

const COMMAND_NAME: &str = "chat";

/// Parses the `chat group` argument; only the exact words `true` and `false` are accepted.
pub fn parse_isolation_arg(raw: &str) -> Option<bool> {
    match raw.trim() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn isolation_reply(enabled: bool) -> String {
    let state = if enabled { "启用" } else { "禁用" };
    format!("已{state}群聊会话隔离，已清理对应会话")
}

/// Returns true when `content` invokes the `chat` prefix command.
pub fn is_command_invocation(content: &str, prefix: &str) -> bool {
    content
        .trim_start()
        .strip_prefix(prefix)
        .and_then(|rest| rest.split(char::is_whitespace).next())
        .is_some_and(|name| name == COMMAND_NAME)
}

fn command_scope(ctx: Context<'_>) -> ChatScope {
    match ctx.guild_id() {
        Some(_) => ChatScope::Group {
            group_id: ctx.channel_id().get(),
        },
        None => ChatScope::Private,
    }
}

/// Chat administration commands.
#[poise::command(
    prefix_command,
    slash_command,
    owners_only,
    subcommands("model", "group"),
    subcommand_required
)]
pub async fn chat(_ctx: Context<'_>) -> Result<()> {
    Ok(())
}

/// Show or switch the chat model. Switching clears every session.
#[poise::command(prefix_command, slash_command, owners_only)]
pub async fn model(
    ctx: Context<'_>,
    #[description = "Model name to switch to"] name: Option<String>,
) -> Result<()> {
    let chat = ctx.data().chat();
    let Some(name) = name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()) else {
        ctx.say(format!("当前模型: {}", chat.current_model().await))
            .await?;
        return Ok(());
    };

    let reply = match chat.switch_model(&name).await {
        Ok(_) => {
            info!("{} switched the model to {name}", ctx.author().tag());
            format!("已切换到模型: {name}")
        }
        Err(e) => {
            error!("Model switch to {name} failed: {e}");
            format!("切换模型失败: {e}")
        }
    };
    ctx.say(reply).await?;
    Ok(())
}

/// Show or toggle per-user session isolation in group chats.
#[poise::command(prefix_command, slash_command, owners_only)]
pub async fn group(
    ctx: Context<'_>,
    #[description = "true or false"] value: Option<String>,
) -> Result<()> {
    let chat = ctx.data().chat();
    let Some(raw) = value.filter(|v| !v.trim().is_empty()) else {
        ctx.say(format!("当前群聊会话隔离: {}", chat.isolation().await))
            .await?;
        return Ok(());
    };

    let Some(enabled) = parse_isolation_arg(&raw) else {
        ctx.say("请输入 true 或 false").await?;
        return Ok(());
    };

    chat.set_isolation(enabled, command_scope(ctx)).await;
    ctx.say(isolation_reply(enabled)).await?;
    Ok(())
}

/// Get available chat commands.
#[must_use]
pub fn chat_commands() -> Vec<poise::Command<Data, BotError>> {
    vec![chat()]
}
