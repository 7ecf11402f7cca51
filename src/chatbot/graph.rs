//! Model/tool orchestration graph with per-session checkpoint memory.

use std::sync::Arc;

use log::{debug, warn};

use super::reply::TOOL_FAILURE_PREFIX;
use crate::error::{BotError, Result};
use crate::llm::{ChatModel, InvalidToolCall, Message, MessageContent, Tool, ToolCall};
use crate::tools::{ToolExecutor, get_tool_definitions};

/// Maximum number of model calls in one invocation.
pub const MAX_GRAPH_STEPS: usize = 10;

/// Conversation history preserved across turns for one conversation key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Checkpoint {
    messages: Vec<Message>,
}

impl Checkpoint {
    #[cfg(test)]
    pub(crate) fn messages(&self) -> &[Message] {
        &self.messages
    }
}

/// Final state of a graph run.
#[derive(Debug, Clone)]
pub struct GraphOutput {
    pub messages: Vec<Message>,
}

/// Holds everything a graph needs except conversation state.
pub struct GraphBuilder {
    model: Arc<dyn ChatModel>,
    tools: Arc<ToolExecutor>,
    tool_definitions: Arc<[Tool]>,
    system_prompt: Arc<str>,
}

impl GraphBuilder {
    pub fn new(model: Arc<dyn ChatModel>, tools: Arc<ToolExecutor>, system_prompt: &str) -> Self {
        Self {
            model,
            tools,
            tool_definitions: get_tool_definitions().into(),
            system_prompt: system_prompt.into(),
        }
    }

    /// Same tools and prompt, different model.
    pub fn with_model(&self, model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            tools: Arc::clone(&self.tools),
            tool_definitions: Arc::clone(&self.tool_definitions),
            system_prompt: Arc::clone(&self.system_prompt),
        }
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    pub fn compile(&self) -> CompiledGraph {
        CompiledGraph {
            model: Arc::clone(&self.model),
            tools: Arc::clone(&self.tools),
            tool_definitions: Arc::clone(&self.tool_definitions),
            system_prompt: Arc::clone(&self.system_prompt),
        }
    }
}

/// An executable graph: call the model, run requested tools, repeat until it answers.
#[derive(Clone)]
pub struct CompiledGraph {
    model: Arc<dyn ChatModel>,
    tools: Arc<ToolExecutor>,
    tool_definitions: Arc<[Tool]>,
    system_prompt: Arc<str>,
}

impl CompiledGraph {
    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Runs one turn for `input` on top of `checkpoint`.
    ///
    /// The checkpoint is only updated when the run succeeds.
    pub async fn invoke(&self, checkpoint: &mut Checkpoint, input: Message) -> Result<GraphOutput> {
        let mut messages = checkpoint.messages.clone();
        messages.push(input);

        for step in 1..=MAX_GRAPH_STEPS {
            let mut request = Vec::with_capacity(messages.len() + 1);
            request.push(Message::system(self.system_prompt.as_ref()));
            request.extend(messages.iter().cloned());

            let reply = self.model.complete(&request, &self.tool_definitions).await?;
            let reply = split_invalid_tool_calls(reply);

            if !reply.invalid_tool_calls.is_empty() {
                warn!(
                    "Model produced {} malformed tool calls at step {step}",
                    reply.invalid_tool_calls.len()
                );
                messages.push(reply);
                return Ok(self.finish(checkpoint, messages));
            }

            let Some(tool_calls) = reply.tool_calls.clone().filter(|calls| !calls.is_empty())
            else {
                messages.push(reply);
                return Ok(self.finish(checkpoint, messages));
            };

            debug!("Step {step}: running {} tool calls", tool_calls.len());
            messages.push(reply);
            for call in tool_calls {
                let content = match self
                    .tools
                    .execute(&call.function.name, &call.function.arguments)
                    .await
                {
                    Ok(output) => output,
                    Err(e) => {
                        warn!("Tool execution failed: {e}");
                        format!("Error: {e}")
                    }
                };
                messages.push(Message::tool_result(call.id, content));
            }
        }

        Err(BotError::GraphStepLimit)
    }

    fn finish(&self, checkpoint: &mut Checkpoint, messages: Vec<Message>) -> GraphOutput {
        debug!(
            "Graph on {} finished with {} messages",
            self.model_name(),
            messages.len()
        );
        checkpoint.messages.clone_from(&messages);
        GraphOutput { messages }
    }
}

/// Moves tool calls whose arguments are not a JSON object into `invalid_tool_calls`.
///
/// When any call is malformed none of them run, so `tool_calls` is cleared.
/// An assistant message needs content or tool calls to be accepted upstream
/// on later turns, so blank content is replaced with the failure text.
fn split_invalid_tool_calls(mut message: Message) -> Message {
    let Some(calls) = message.tool_calls.as_ref() else {
        return message;
    };

    let invalid: Vec<InvalidToolCall> = calls.iter().filter_map(check_arguments).collect();
    if let Some(first) = invalid.first() {
        if message.text().trim().is_empty() {
            message.content = Some(MessageContent::Text(format!(
                "{TOOL_FAILURE_PREFIX}{}",
                first.error
            )));
        }
        message.tool_calls = None;
        message.invalid_tool_calls = invalid;
    }
    message
}

fn check_arguments(call: &ToolCall) -> Option<InvalidToolCall> {
    let error = match serde_json::from_str::<serde_json::Value>(&call.function.arguments) {
        Ok(value) if value.is_object() => return None,
        Ok(_) => "arguments must be a JSON object".to_string(),
        Err(e) => format!("Function {} arguments could not be parsed: {e}", call.function.name),
    };
    Some(InvalidToolCall {
        id: call.id.clone(),
        name: call.function.name.clone(),
        arguments: call.function.arguments.clone(),
        error,
    })
}
