//! Discord bot setup and event dispatch.

use std::sync::Arc;

use log::{debug, error, info};
use poise::{
    Framework, FrameworkError, FrameworkOptions, PrefixFrameworkOptions, builtins,
    serenity_prelude::{ClientBuilder, Context, FullEvent, GatewayIntents, UserId},
};

use crate::chatbot::{ChatService, GraphBuilder, ModelFactory, handle_message};
use crate::commands::chat_commands;
use crate::config::{Config, LlmConfig};
use crate::error::{BotError, Result};
use crate::llm::{ChatCompletionsClient, ChatModel};
use crate::tools::ToolExecutor;

/// State shared with every command and event handler.
pub struct Data {
    chat: Arc<ChatService>,
    command_prefix: String,
}

impl Data {
    pub fn chat(&self) -> &ChatService {
        &self.chat
    }

    pub fn command_prefix(&self) -> &str {
        &self.command_prefix
    }
}

/// Builds chat models against the configured endpoint.
fn model_factory(llm: &LlmConfig) -> ModelFactory {
    let api_key = llm.api_key.clone();
    let base_url = llm.base_url.clone();
    Arc::new(move |name: &str| {
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(BotError::InvalidModel(name.to_string()));
        }
        let model: Arc<dyn ChatModel> = Arc::new(ChatCompletionsClient::new(
            api_key.clone(),
            base_url.clone(),
            name.to_string(),
        ));
        Ok(model)
    })
}

/// Run the Discord bot.
pub async fn run() -> Result<()> {
    info!("Initializing bot");
    let config = Config::from_env()?;

    debug!("Initializing chat service with model {}", config.llm.model);
    let factory = model_factory(&config.llm);
    let tools = Arc::new(ToolExecutor::new(config.image.clone()));
    let graph_builder =
        GraphBuilder::new(factory(&config.llm.model)?, tools, &config.llm.system_prompt);
    let chat = Arc::new(ChatService::new(config.chat.clone(), graph_builder, factory));

    debug!("Setting up gateway intents");
    let intents = GatewayIntents::non_privileged()
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::DIRECT_MESSAGES;

    let owners = config
        .admin_user_ids
        .iter()
        .map(|id| UserId::new(*id))
        .collect();
    let command_prefix = config.command_prefix.clone();

    debug!("Building framework");
    let framework = Framework::builder()
        .options(FrameworkOptions {
            commands: chat_commands(),
            owners,
            prefix_options: PrefixFrameworkOptions {
                prefix: Some(config.command_prefix.clone()),
                mention_as_prefix: false,
                ..Default::default()
            },
            on_error: |error| Box::pin(on_error(error)),
            event_handler: |ctx, event, _framework, data| Box::pin(event_handler(ctx, event, data)),
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                info!("Bot is ready and connected to Discord");
                debug!("Registering commands globally");
                builtins::register_globally(ctx, &framework.options().commands).await?;
                info!("Commands registered successfully");
                Ok(Data {
                    chat,
                    command_prefix,
                })
            })
        })
        .build();

    debug!("Creating Discord client");
    let mut client = ClientBuilder::new(config.discord_token, intents)
        .framework(framework)
        .await?;

    info!("Starting Discord client");

    tokio::select! {
        result = client.start() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, shutting down...");
        }
    }

    Ok(())
}

async fn event_handler(ctx: &Context, event: &FullEvent, data: &Data) -> Result<()> {
    if let FullEvent::Message { new_message } = event {
        handle_message(ctx, new_message, data).await?;
    }
    Ok(())
}

async fn on_error(error: FrameworkError<'_, Data, BotError>) {
    match error {
        FrameworkError::Command { error, ctx, .. } => {
            error!("Command '{}' failed: {error}", ctx.command().qualified_name);
            if let Err(e) = ctx.say(error.user_message()).await {
                error!("Failed to report command error: {e}");
            }
        }
        FrameworkError::EventHandler { error, event, .. } => {
            error!("Event handler failed on {}: {error}", event.snake_case_name());
        }
        other => {
            if let Err(e) = builtins::on_error(other).await {
                error!("Error while handling framework error: {e}");
            }
        }
    }
}
