//! Conversation agent for one session.
//!
//! # Design Principles
//!
//! - **Shortcuts first**: quick replies and wake words never reach the model.
//! - **Bounded tool loop**: the model may call tools for at most
//!   `max_tool_rounds` rounds; the final round offers no tools so it has to
//!   answer in text.
//! - **Tool failures are answers**: a failing tool is reported back to the
//!   model as an error result instead of failing the turn.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use voxhub_core::{
    AgentConfig, ChatMessage, ChatModel, ChatReply, ChatRequest, ToolCall, ToolExecutor,
};

use crate::error::AgentError;

pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 5;

/// Messages of conversation history kept per session.
const HISTORY_LIMIT: usize = 40;

pub struct Agent {
    chat: Arc<dyn ChatModel>,
    tools: Arc<dyn ToolExecutor>,
    config: AgentConfig,
    max_tool_rounds: usize,
    history: Mutex<Vec<ChatMessage>>,
    wake_cursor: AtomicUsize,
}

impl Agent {
    pub fn new(chat: Arc<dyn ChatModel>, tools: Arc<dyn ToolExecutor>, config: AgentConfig) -> Self {
        Self {
            chat,
            tools,
            config,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            history: Mutex::new(Vec::new()),
            wake_cursor: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub const fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Conversation so far, oldest first.
    pub fn history(&self) -> Vec<ChatMessage> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Produce the reply to one user utterance.
    pub async fn respond(&self, input: &str) -> Result<String, AgentError> {
        let input = input.trim();

        if let Some(reply) = self.config.quick_reply(input) {
            tracing::debug!(input, "Quick reply");
            return Ok(reply.to_string());
        }
        if self.config.is_wake_word(input) {
            return Ok(self.next_wake_word());
        }

        let mut messages = Vec::with_capacity(HISTORY_LIMIT + 2);
        messages.push(ChatMessage::system(self.config.system_prompt.clone()));
        messages.extend(self.history());
        messages.push(ChatMessage::user(input));

        let specs = self.tools.specs();
        for round in 0..=self.max_tool_rounds {
            let last_round = round == self.max_tool_rounds;
            let request = ChatRequest {
                model: self.config.llm_model.clone(),
                messages: messages.clone(),
                tools: if last_round { Vec::new() } else { specs.clone() },
            };

            match self.chat.complete(request).await? {
                ChatReply::Text(text) => {
                    self.remember(input, &text);
                    return Ok(text);
                }
                ChatReply::ToolCalls { content, calls } => {
                    if last_round {
                        break;
                    }
                    tracing::debug!(round, calls = calls.len(), "Model requested tools");
                    messages.push(ChatMessage::assistant_tool_calls(content, calls.clone()));
                    for call in calls {
                        let result = self.run_tool(&call).await;
                        messages.push(ChatMessage::tool_result(call.id, result));
                    }
                }
            }
        }

        Err(AgentError::ToolRounds(self.max_tool_rounds))
    }

    async fn run_tool(&self, call: &ToolCall) -> String {
        match self.tools.call(&call.name, call.arguments.clone()).await {
            Ok(output) if output.is_error => format!("Error: {}", output.content),
            Ok(output) => output.content,
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "Tool call failed");
                format!("Error: {e}")
            }
        }
    }

    fn next_wake_word(&self) -> String {
        let words = &self.config.wake_words;
        let index = self.wake_cursor.fetch_add(1, Ordering::Relaxed) % words.len().max(1);
        words.get(index).cloned().unwrap_or_default()
    }

    fn remember(&self, input: &str, reply: &str) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history.push(ChatMessage::user(input));
        history.push(ChatMessage::assistant(reply));
        if history.len() > HISTORY_LIMIT {
            let excess = history.len() - HISTORY_LIMIT;
            history.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{EXIT_INTENT_TOOL, ExitIntent, Toolbox};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use voxhub_core::{ChatRole, ProviderError};

    /// Replays scripted replies and records every request.
    struct Scripted {
        replies: Mutex<VecDeque<ChatReply>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl Scripted {
        fn new(replies: Vec<ChatReply>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatModel for Scripted {
        async fn complete(&self, request: ChatRequest) -> Result<ChatReply, ProviderError> {
            self.requests.lock().unwrap().push(request);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ProviderError::request("llm", "script exhausted"))
        }
    }

    fn tool_call(name: &str) -> ChatReply {
        ChatReply::ToolCalls {
            content: None,
            calls: vec![ToolCall {
                id: format!("call_{name}"),
                name: name.to_string(),
                arguments: json!({}),
            }],
        }
    }

    fn config() -> AgentConfig {
        AgentConfig {
            wake_words: vec!["hi".into(), "hey".into()],
            quick_replies: vec!["ping".into(), "pong".into()],
            ..AgentConfig::default()
        }
    }

    #[tokio::test]
    async fn shortcuts_skip_the_model() {
        let chat = Scripted::new(Vec::new());
        let agent = Agent::new(chat.clone(), Arc::new(Toolbox::new()), config());

        assert_eq!(agent.respond(" PING ").await.unwrap(), "pong");
        assert_eq!(agent.respond("hi").await.unwrap(), "hi");
        assert_eq!(agent.respond("Hi").await.unwrap(), "hey");
        assert_eq!(agent.respond("hi").await.unwrap(), "hi");
        assert!(chat.requests().is_empty());
    }

    #[tokio::test]
    async fn text_reply_is_remembered() {
        let chat = Scripted::new(vec![
            ChatReply::Text("Paris.".into()),
            ChatReply::Text("About two million.".into()),
        ]);
        let agent = Agent::new(chat.clone(), Arc::new(Toolbox::new()), config());

        agent.respond("Capital of France?").await.unwrap();
        agent.respond("Population?").await.unwrap();

        let second = &chat.requests()[1];
        let roles: Vec<_> = second.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                ChatRole::System,
                ChatRole::User,
                ChatRole::Assistant,
                ChatRole::User
            ]
        );
        assert_eq!(agent.history().len(), 4);
    }

    #[tokio::test]
    async fn tool_results_feed_back_to_the_model() {
        let exit = ExitIntent::new();
        let chat = Scripted::new(vec![
            tool_call(EXIT_INTENT_TOOL),
            ChatReply::Text("Goodbye!".into()),
        ]);
        let agent = Agent::new(chat.clone(), Arc::new(Toolbox::new().with(exit.clone())), config());

        assert_eq!(agent.respond("bye now").await.unwrap(), "Goodbye!");
        assert!(exit.is_requested());

        let requests = chat.requests();
        assert_eq!(requests[0].tools.len(), 1);
        let last = requests[1].messages.last().unwrap();
        assert_eq!(last.role, ChatRole::Tool);
        assert_eq!(last.tool_call_id.as_deref(), Some("call_exit_intent"));
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_not_fatal() {
        let chat = Scripted::new(vec![tool_call("missing"), ChatReply::Text("Sorry.".into())]);
        let agent = Agent::new(chat.clone(), Arc::new(Toolbox::new()), config());

        assert_eq!(agent.respond("do it").await.unwrap(), "Sorry.");
        let tool_msg = chat.requests()[1].messages.last().cloned().unwrap();
        assert!(tool_msg.content.unwrap().starts_with("Error:"));
    }

    #[tokio::test]
    async fn tool_rounds_are_bounded() {
        let chat = Scripted::new((0..4).map(|_| tool_call("missing")).collect());
        let agent =
            Agent::new(chat.clone(), Arc::new(Toolbox::new()), config()).with_max_tool_rounds(2);

        assert!(matches!(
            agent.respond("loop").await,
            Err(AgentError::ToolRounds(2))
        ));
        let requests = chat.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests[2].tools.is_empty());
        assert!(agent.history().is_empty());
    }

    #[tokio::test]
    async fn provider_error_propagates() {
        let chat = Scripted::new(Vec::new());
        let agent = Agent::new(chat, Arc::new(Toolbox::new()), config());
        assert!(matches!(
            agent.respond("hello there").await,
            Err(AgentError::Provider(_))
        ));
    }
}
