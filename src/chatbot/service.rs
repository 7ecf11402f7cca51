//! Application context: settings, sessions and the graph builder, and the
//! per-message flow tying them together.

use std::sync::Arc;

use log::{debug, error, info};
use tokio::sync::{Mutex, RwLock};

use crate::config::ChatSettings;
use crate::error::{BotError, Result};
use crate::llm::{ChatModel, Message};
use crate::session::{ChatScope, ConversationKey, SessionStore, stale_after_isolation_change};

use super::adapter::{Adapted, adapt};
use super::graph::{Checkpoint, CompiledGraph, GraphBuilder, GraphOutput};
use super::reply::{extract_reply, format_transcript};
use super::segments::InboundMessage;
use super::trigger::should_respond;

const GROUP_DISABLED: &str = "不可以在群聊中使用";
const PRIVATE_DISABLED: &str = "不可以在私聊中使用";

/// Builds a model handle from a model name.
pub type ModelFactory = Arc<dyn Fn(&str) -> Result<Arc<dyn ChatModel>> + Send + Sync>;

/// Execution state of one conversation.
pub struct SessionState {
    checkpoint: Checkpoint,
    graph: CompiledGraph,
}

impl SessionState {
    pub fn new(graph: CompiledGraph) -> Self {
        Self {
            checkpoint: Checkpoint::default(),
            graph,
        }
    }

    pub async fn invoke(&mut self, input: Message) -> Result<GraphOutput> {
        self.graph.invoke(&mut self.checkpoint, input).await
    }
}

pub struct ChatService {
    settings: RwLock<ChatSettings>,
    sessions: Mutex<SessionStore<SessionState>>,
    graph_builder: RwLock<Arc<GraphBuilder>>,
    model_factory: ModelFactory,
}

impl ChatService {
    pub fn new(
        settings: ChatSettings,
        graph_builder: GraphBuilder,
        model_factory: ModelFactory,
    ) -> Self {
        Self {
            sessions: Mutex::new(SessionStore::new(settings.max_sessions)),
            settings: RwLock::new(settings),
            graph_builder: RwLock::new(Arc::new(graph_builder)),
            model_factory,
        }
    }

    pub async fn settings(&self) -> ChatSettings {
        self.settings.read().await.clone()
    }

    /// Whether `message` is addressed to the bot under the current settings.
    pub async fn triggers(&self, message: &InboundMessage) -> bool {
        should_respond(message, &*self.settings.read().await)
    }

    /// Handles one inbound message, returning the reply to send if any.
    pub async fn respond(&self, message: &InboundMessage) -> Option<String> {
        let settings = self.settings().await;
        if !should_respond(message, &settings) {
            return None;
        }

        match message.scope {
            ChatScope::Group { .. } if !settings.enable_group => {
                return Some(GROUP_DISABLED.to_string());
            }
            ChatScope::Private if !settings.enable_private => {
                return Some(PRIVATE_DISABLED.to_string());
            }
            _ => {}
        }

        let prompt = match adapt(message, &settings) {
            Adapted::Empty(reply) => return Some(reply),
            Adapted::Prompt(prompt) => prompt,
        };

        let (key, session) = self.session_for(message).await;
        info!("Current thread: {key}");

        let mut state = session.lock().await;
        let reply = match state.invoke(Message::user(prompt)).await {
            Ok(output) => {
                debug!("Transcript for {key}:\n{}", format_transcript(&output.messages));
                extract_reply(&output.messages)
            }
            Err(e) => {
                error!("Graph invocation failed for {key}: {e}");
                format!("抱歉，在处理您的请求时出现问题。错误信息：{e}")
            }
        };
        Some(reply)
    }

    /// Looks up or creates the session for `message`.
    ///
    /// The isolation flag and graph builder are read under the store lock;
    /// `switch_model` and `set_isolation` change them under the same lock.
    async fn session_for(
        &self,
        message: &InboundMessage,
    ) -> (ConversationKey, Arc<Mutex<SessionState>>) {
        let mut sessions = self.sessions.lock().await;
        let isolated = self.settings.read().await.group_chat_isolation;
        let key = ConversationKey::for_message(message.scope, message.user_id, isolated);
        let builder = self.graph_builder.read().await;
        let session = sessions.get_or_create(&key, || SessionState::new(builder.compile()));
        (key, session)
    }

    pub async fn current_model(&self) -> String {
        self.graph_builder.read().await.model_name().to_string()
    }

    /// Switches every new session to `model_name` and drops all existing sessions.
    ///
    /// Returns the number of sessions cleared. Nothing changes on error.
    pub async fn switch_model(&self, model_name: &str) -> Result<usize> {
        let model_name = model_name.trim();
        if model_name.is_empty() {
            return Err(BotError::InvalidModel("model name is empty".to_string()));
        }
        let model = (self.model_factory)(model_name)?;

        let mut sessions = self.sessions.lock().await;
        let mut builder = self.graph_builder.write().await;
        *builder = Arc::new(builder.with_model(model));
        let cleared = sessions.clear_all();
        info!("Switched model to {model_name}, cleared {cleared} sessions");
        Ok(cleared)
    }

    pub async fn isolation(&self) -> bool {
        self.settings.read().await.group_chat_isolation
    }

    /// Sets group chat isolation and drops the sessions keyed under the
    /// previous scheme for `scope`. Returns the number of sessions cleared.
    pub async fn set_isolation(&self, enabled: bool, scope: ChatScope) -> usize {
        let mut sessions = self.sessions.lock().await;
        self.settings.write().await.group_chat_isolation = enabled;
        let cleared = sessions.clear(|key| stale_after_isolation_change(key, scope, enabled));
        info!("Group chat isolation set to {enabled}, cleared {cleared} sessions");
        cleared
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn has_session(&self, key: &str) -> bool {
        self.sessions.lock().await.contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chatbot::graph::tests::{ScriptedModel, tool_call_message, tool_executor};
    use crate::chatbot::reply::NOT_UNDERSTOOD;
    use crate::chatbot::segments::{Segment, parse_content};
    use crate::types::TriggerMode;

    const BOT_ID: u64 = 9;

    fn scripted_factory() -> ModelFactory {
        Arc::new(|name: &str| {
            if name == "broken" {
                return Err(BotError::InvalidModel(name.to_string()));
            }
            let model: Arc<dyn ChatModel> = Arc::new(ScriptedModel::new(name, Vec::new()));
            Ok(model)
        })
    }

    fn service_with(model: ScriptedModel, settings: ChatSettings) -> ChatService {
        let builder = GraphBuilder::new(Arc::new(model), tool_executor(), "prompt");
        ChatService::new(settings, builder, scripted_factory())
    }

    fn group_message(group_id: u64, user_id: u64, content: &str) -> InboundMessage {
        let segments = parse_content(content);
        let to_me = segments
            .iter()
            .any(|s| matches!(s, Segment::Mention { user_id } if *user_id == BOT_ID));
        InboundMessage {
            scope: ChatScope::Group { group_id },
            user_id,
            segments,
            reply: None,
            to_me,
        }
    }

    fn private_message(user_id: u64, content: &str) -> InboundMessage {
        InboundMessage {
            scope: ChatScope::Private,
            user_id,
            segments: parse_content(content),
            reply: None,
            to_me: true,
        }
    }

    #[tokio::test]
    async fn untriggered_messages_are_ignored() {
        let service = service_with(ScriptedModel::new("m", Vec::new()), ChatSettings::default());
        assert_eq!(service.respond(&group_message(1, 2, "hello all")).await, None);
        assert_eq!(service.session_count().await, 0);
    }

    #[tokio::test]
    async fn mention_gets_model_reply_in_isolated_session() {
        let model = ScriptedModel::new("m", vec![Ok(Message::assistant(" 你好呀 "))]);
        let service = service_with(model, ChatSettings::default());

        let reply = service.respond(&group_message(1, 2, "<@9> 你好")).await;
        assert_eq!(reply.as_deref(), Some("你好呀"));
        assert!(service.has_session("group_1_2").await);
    }

    #[tokio::test]
    async fn disabled_scopes_are_refused() {
        let settings = ChatSettings {
            enable_group: false,
            enable_private: false,
            ..ChatSettings::default()
        };
        let service = service_with(ScriptedModel::new("m", Vec::new()), settings);

        assert_eq!(
            service.respond(&group_message(1, 2, "<@9> hi")).await.as_deref(),
            Some(GROUP_DISABLED)
        );
        assert_eq!(
            service.respond(&private_message(2, "hi")).await.as_deref(),
            Some(PRIVATE_DISABLED)
        );
    }

    #[tokio::test]
    async fn blank_prompt_skips_the_graph() {
        let service = service_with(ScriptedModel::new("m", Vec::new()), ChatSettings::default());
        let reply = service.respond(&group_message(1, 2, "<@9>  ")).await;
        assert_eq!(reply.as_deref(), Some("您想说什么呢?"));
        assert_eq!(service.session_count().await, 0);
    }

    #[tokio::test]
    async fn graph_errors_become_user_text() {
        let model = ScriptedModel::new(
            "m",
            vec![Err(BotError::ChatResponse("upstream down".to_string()))],
        );
        let service = service_with(model, ChatSettings::default());

        let reply = service
            .respond(&private_message(3, "hi"))
            .await
            .expect("reply");
        assert!(reply.starts_with("抱歉，在处理您的请求时出现问题。错误信息："));
        assert!(reply.contains("upstream down"));
    }

    #[tokio::test]
    async fn malformed_tool_call_is_reported() {
        let model = ScriptedModel::new("m", vec![Ok(tool_call_message("get_time", "[1"))]);
        let service = service_with(model, ChatSettings::default());
        let reply = service
            .respond(&private_message(3, "time"))
            .await
            .expect("reply");
        assert!(reply.starts_with("工具调用失败: "));
    }

    #[tokio::test]
    async fn empty_model_answer_is_not_understood() {
        let model = ScriptedModel::new("m", vec![Ok(Message::assistant(""))]);
        let service = service_with(model, ChatSettings::default());
        let reply = service.respond(&private_message(3, "?")).await;
        assert_eq!(reply.as_deref(), Some(NOT_UNDERSTOOD));
    }

    #[tokio::test]
    async fn session_count_is_bounded() {
        let settings = ChatSettings {
            max_sessions: 2,
            ..ChatSettings::default()
        };
        let service = service_with(ScriptedModel::new("m", Vec::new()), settings);

        for user in [1, 2, 3] {
            service.respond(&private_message(user, "hi")).await;
            assert!(service.session_count().await <= 2);
        }
        assert!(!service.has_session("private_1").await);
        assert!(service.has_session("private_2").await);
        assert!(service.has_session("private_3").await);
    }

    #[tokio::test]
    async fn keyword_mode_triggers_without_mention() {
        let settings = ChatSettings {
            trigger_modes: vec![TriggerMode::Keyword],
            trigger_words: vec!["小助手".to_string()],
            group_chat_isolation: false,
            ..ChatSettings::default()
        };
        let model = ScriptedModel::new("m", vec![Ok(Message::assistant("在"))]);
        let service = service_with(model, settings);

        let reply = service.respond(&group_message(4, 5, "小助手 在吗")).await;
        assert_eq!(reply.as_deref(), Some("在"));
        assert!(service.has_session("group_4").await);
    }

    #[tokio::test]
    async fn switching_model_round_trip_clears_sessions() {
        let model = ScriptedModel::new("original", Vec::new());
        let service = service_with(model, ChatSettings::default());

        service.respond(&private_message(1, "hi")).await;
        assert_eq!(service.switch_model("other").await.expect("switch"), 1);
        assert_eq!(service.current_model().await, "other");

        service.respond(&private_message(1, "hi")).await;
        assert_eq!(service.switch_model("original").await.expect("switch back"), 1);
        assert_eq!(service.current_model().await, "original");
        assert_eq!(service.session_count().await, 0);
    }

    #[tokio::test]
    async fn failed_model_switch_changes_nothing() {
        let model = ScriptedModel::new("original", Vec::new());
        let service = service_with(model, ChatSettings::default());
        service.respond(&private_message(1, "hi")).await;

        assert!(service.switch_model("broken").await.is_err());
        assert!(service.switch_model("  ").await.is_err());
        assert_eq!(service.current_model().await, "original");
        assert_eq!(service.session_count().await, 1);
    }

    #[tokio::test]
    async fn enabling_isolation_clears_shared_group_session_only() {
        let settings = ChatSettings {
            group_chat_isolation: false,
            ..ChatSettings::default()
        };
        let service = service_with(ScriptedModel::new("m", Vec::new()), settings);

        service.respond(&group_message(7, 1, "<@9> hi")).await;
        service.respond(&group_message(8, 1, "<@9> hi")).await;
        service.respond(&private_message(1, "hi")).await;

        let cleared = service.set_isolation(true, ChatScope::Group { group_id: 7 }).await;
        assert_eq!(cleared, 1);
        assert!(service.isolation().await);
        assert!(!service.has_session("group_7").await);
        assert!(service.has_session("group_8").await);
        assert!(service.has_session("private_1").await);

        service.respond(&group_message(7, 1, "<@9> hi")).await;
        assert!(service.has_session("group_7_1").await);
    }

    #[tokio::test]
    async fn session_state_survives_between_turns() {
        let model = ScriptedModel::new(
            "m",
            vec![Ok(Message::assistant("one")), Ok(Message::assistant("two"))],
        );
        let service = service_with(model, ChatSettings::default());
        service.respond(&private_message(1, "a")).await;
        service.respond(&private_message(1, "b")).await;

        let session = service.sessions.lock().await.get_or_create(
            &ConversationKey::for_message(ChatScope::Private, 1, true),
            || unreachable!("session exists"),
        );
        assert_eq!(session.lock().await.checkpoint.messages().len(), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn sessions_created_during_model_switch_use_new_model() {
        let service = Arc::new(service_with(
            ScriptedModel::new("original", Vec::new()),
            ChatSettings::default(),
        ));

        let mut tasks = Vec::new();
        for user in 0..32 {
            let service = Arc::clone(&service);
            tasks.push(tokio::spawn(async move {
                service.respond(&private_message(user, "hi")).await;
            }));
        }
        service.switch_model("other").await.expect("switch");
        for task in tasks {
            task.await.expect("respond task");
        }

        for user in 0..32 {
            let key = ConversationKey::for_message(ChatScope::Private, user, true);
            if !service.has_session(key.as_str()).await {
                continue;
            }
            let session = service
                .sessions
                .lock()
                .await
                .get_or_create(&key, || unreachable!("session exists"));
            let state = session.lock().await;
            // anything surviving the clear was created after the switch
            assert_eq!(state.graph.model_name(), "other");
        }
    }
}
