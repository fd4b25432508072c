mod state;

pub use state::{LoopOutcome, LoopPhase, LoopState, LoopStatus, FALLBACK_MESSAGE};

use std::sync::Arc;

use anyhow::anyhow;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use indoc::indoc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::bridge::tools_to_openai_spec;
use crate::errors::{LoopError, RegistryError};
use crate::invoker::ToolInvoker;
use crate::models::conversation::Conversation;
use crate::models::message::{Message, ToolRequest};
use crate::models::tool::Tool;
use crate::providers::base::{Provider, ToolChoice};
use crate::registry::Toolbox;

pub const DEFAULT_MAX_STEPS: usize = 5;

pub const DEFAULT_SYSTEM_PROMPT: &str = indoc! {"
    You are a helpful assistant. Use tools when needed to get real data.
    You can call multiple tools to gather all the information before answering."};

/// Knobs for a single agent
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    /// Seeded as the first message of every fresh conversation
    pub system_prompt: Option<String>,
    /// Tool dispatch rounds allowed before the loop gives up
    pub max_steps: usize,
    pub tool_choice: ToolChoice,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: Some(DEFAULT_SYSTEM_PROMPT.to_string()),
            max_steps: DEFAULT_MAX_STEPS,
            tool_choice: ToolChoice::Auto,
        }
    }
}

/// Progress reported while a run is in flight
#[derive(Debug, Clone)]
pub enum LoopEvent {
    /// A message appended to the conversation: an assistant turn carrying tool
    /// requests, or the tool message answering one of those requests
    Message(Message),
    /// The run reached a terminal state
    Finished(LoopOutcome),
}

/// Agent pairs a completion provider with the tools it may call and drives
/// the request/dispatch loop between them
pub struct Agent {
    provider: Box<dyn Provider>,
    invoker: ToolInvoker,
    config: AgentConfig,
}

impl Agent {
    /// Create an agent over the given toolbox. Every tool must translate to
    /// the provider dialect, so a bad schema fails here rather than mid-run.
    pub fn new(
        provider: Box<dyn Provider>,
        toolbox: Arc<dyn Toolbox>,
        config: AgentConfig,
    ) -> Result<Self, RegistryError> {
        if config.max_steps == 0 {
            return Err(RegistryError::ZeroStepBudget);
        }
        tools_to_openai_spec(toolbox.tools())?;
        let invoker = ToolInvoker::new(toolbox)?;
        Ok(Self {
            provider,
            invoker,
            config,
        })
    }

    pub fn tools(&self) -> &[Tool] {
        self.invoker.tools()
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// A fresh conversation holding the system prompt and the user's text
    pub fn start<S: Into<String>>(&self, user_text: S) -> Conversation {
        Conversation::seeded(self.config.system_prompt.as_deref(), user_text)
    }

    /// Create a stream that yields each message as the loop appends it, then
    /// the outcome. The whole conversation is resent to the provider on every
    /// step.
    pub fn reply(&self, conversation: Conversation) -> BoxStream<'_, Result<LoopEvent, LoopError>> {
        Box::pin(async_stream::try_stream! {
            let span = info_span!("agent_run", run_id = %Uuid::new_v4());
            let tools = self.invoker.tools();
            let mut state = LoopState::new(conversation, self.config.max_steps);
            info!(parent: &span, tools = tools.len(), budget = state.budget(), "agent run started");

            loop {
                match state.phase() {
                    LoopPhase::AwaitingModel => {
                        debug!(parent: &span, step = state.steps(), messages = state.conversation().len(), "requesting completion");
                        let (response, usage) = self
                            .provider
                            .complete(state.conversation(), tools, self.config.tool_choice)
                            .instrument(span.clone())
                            .await
                            .map_err(LoopError::Upstream)?;
                        debug!(parent: &span, input_tokens = ?usage.input_tokens, output_tokens = ?usage.output_tokens, "completion received");

                        if state.accept_response(response) == LoopPhase::DispatchingTools {
                            if let Some(message) = state.conversation().last() {
                                yield LoopEvent::Message(message.clone());
                            }
                            // let the request surface before tools start running
                            tokio::task::yield_now().await;
                        }
                    }
                    LoopPhase::DispatchingTools => {
                        let requests = state.pending_requests();
                        for request in &requests {
                            info!(
                                parent: &span,
                                id = %request.id,
                                tool = %request.tool_call.name,
                                arguments = %request.tool_call.arguments,
                                "dispatching tool call"
                            );
                        }

                        let refs: Vec<&ToolRequest> = requests.iter().collect();
                        let results = self.invoker.invoke_all(&refs).instrument(span.clone()).await;
                        for (request, result) in requests.iter().zip(&results) {
                            if let Err(e) = result {
                                warn!(parent: &span, id = %request.id, kind = e.kind(), error = %e, "tool call failed");
                            }
                        }

                        for message in state.accept_results(results) {
                            yield LoopEvent::Message(message);
                        }
                        if state.phase() == LoopPhase::Aborted {
                            warn!(parent: &span, steps = state.steps(), "step budget exhausted");
                        }
                    }
                    LoopPhase::Done | LoopPhase::Aborted => break,
                }
            }

            info!(parent: &span, steps = state.steps(), phase = ?state.phase(), "agent run finished");
            yield LoopEvent::Finished(state.into_outcome());
        })
    }

    /// Run the loop over an existing conversation until it terminates
    pub async fn run_conversation(&self, conversation: Conversation) -> Result<LoopOutcome, LoopError> {
        let mut stream = self.reply(conversation);
        while let Some(event) = stream.try_next().await? {
            if let LoopEvent::Finished(outcome) = event {
                return Ok(outcome);
            }
        }
        Err(LoopError::Upstream(anyhow!(
            "agent stream ended before the loop terminated"
        )))
    }

    /// Answer a single question in a fresh conversation
    pub async fn run<S: Into<String>>(&self, user_text: S) -> Result<LoopOutcome, LoopError> {
        self.run_conversation(self.start(user_text)).await
    }

    /// The conversation for the next user turn. An empty history starts fresh.
    pub fn follow_up<S: Into<String>>(&self, mut history: Conversation, user_text: S) -> Conversation {
        if history.is_empty() {
            return self.start(user_text);
        }
        history.push(Message::user().with_text(user_text));
        history
    }

    /// Continue a prior conversation with another user message
    pub async fn run_with_history<S: Into<String>>(
        &self,
        history: Conversation,
        user_text: S,
    ) -> Result<LoopOutcome, LoopError> {
        self.run_conversation(self.follow_up(history, user_text)).await
    }

    /// Like [`Agent::run_conversation`], but stops as soon as `cancel` fires.
    /// Tool calls still in flight are dropped.
    pub async fn run_cancellable(
        &self,
        conversation: Conversation,
        cancel: &CancellationToken,
    ) -> Result<LoopOutcome, LoopError> {
        tokio::select! {
            outcome = self.run_conversation(conversation) => outcome,
            _ = cancel.cancelled() => {
                info!("agent run cancelled");
                Err(LoopError::Cancelled)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{AgentError, AgentResult};
    use crate::models::message::MessageContent;
    use crate::models::role::Role;
    use crate::models::tool::ToolCall;
    use crate::providers::mock::MockProvider;
    use crate::registry::{AsyncFnHandler, FnHandler, ToolRegistry};
    use serde_json::{json, Value};
    use std::time::Duration;

    fn echo_registry() -> Arc<dyn Toolbox> {
        let registry = ToolRegistry::new("test")
            .with_tool(
                Tool::new(
                    "echo",
                    "Echoes back the input",
                    json!({"type": "object", "properties": {"message": {"type": "string"}}, "required": ["message"]}),
                ),
                FnHandler(|args: Value| -> AgentResult<Value> { Ok(args["message"].clone()) }),
            )
            .unwrap()
            .with_tool(
                Tool::new("slow", "Never finishes in time", json!({"type": "object"})),
                AsyncFnHandler(|_args: Value| async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok::<_, AgentError>(json!("late"))
                }),
            )
            .unwrap();
        Arc::new(registry)
    }

    fn agent_with(provider: MockProvider) -> Agent {
        Agent::new(Box::new(provider), echo_registry(), AgentConfig::default()).unwrap()
    }

    fn echo_call(id: &str, message: &str) -> Message {
        Message::assistant().with_tool_request(id, ToolCall::new("echo", json!({"message": message})))
    }

    #[tokio::test]
    async fn test_simple_response() -> anyhow::Result<()> {
        let agent = agent_with(MockProvider::new(vec![
            Message::assistant().with_text("Hello!")
        ]));

        let mut stream = agent.reply(agent.start("Hi"));
        let mut events = Vec::new();
        while let Some(event) = stream.try_next().await? {
            events.push(event);
        }

        assert_eq!(events.len(), 1);
        match &events[0] {
            LoopEvent::Finished(outcome) => {
                assert_eq!(outcome.status, LoopStatus::Done);
                assert_eq!(outcome.answer(), "Hello!");
                // system prompt and user message only
                assert_eq!(outcome.conversation.len(), 2);
                assert_eq!(outcome.conversation[0].role, Role::System);
            }
            other => panic!("unexpected event {:?}", other),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_tool_call_then_answer() -> anyhow::Result<()> {
        let agent = agent_with(MockProvider::new(vec![
            echo_call("1", "test"),
            Message::assistant().with_text("Done!"),
        ]));

        let mut stream = agent.reply(agent.start("Echo test"));
        let mut messages = Vec::new();
        let mut outcome = None;
        while let Some(event) = stream.try_next().await? {
            match event {
                LoopEvent::Message(message) => messages.push(message),
                LoopEvent::Finished(o) => outcome = Some(o),
            }
        }

        assert_eq!(messages.len(), 2);
        assert!(messages[0].has_tool_requests());
        assert_eq!(messages[1].role, Role::Tool);
        assert_eq!(messages[1].tool_response().unwrap().tool_result, Ok(json!("test")));

        let outcome = outcome.unwrap();
        assert_eq!(outcome.answer(), "Done!");
        assert_eq!(outcome.steps, 1);
        assert_eq!(outcome.conversation.len(), 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported_to_model() -> anyhow::Result<()> {
        let agent = agent_with(MockProvider::new(vec![
            Message::assistant().with_tool_request("1", ToolCall::new("nope", json!({}))),
            Message::assistant().with_text("I could not find that tool."),
        ]));

        let outcome = agent.run("use a missing tool").await?;
        let response = outcome.conversation[3].tool_response().unwrap();
        assert_eq!(response.tool_result, Err(AgentError::ToolNotFound("nope".into())));
        assert_eq!(response.payload()["kind"], "unknown_tool");
        assert_eq!(outcome.status, LoopStatus::Done);
        Ok(())
    }

    #[tokio::test]
    async fn test_multiple_tool_calls_keep_order() -> anyhow::Result<()> {
        let agent = agent_with(MockProvider::new(vec![
            Message::assistant()
                .with_tool_request("a", ToolCall::new("echo", json!({"message": "first"})))
                .with_tool_request("b", ToolCall::new("echo", json!({"message": 7})))
                .with_tool_request("c", ToolCall::new("echo", json!({"message": "third"}))),
            Message::assistant().with_text("All done"),
        ]));

        let outcome = agent.run("three at once").await?;
        let responses: Vec<_> = outcome.conversation[3..6]
            .iter()
            .map(|m| m.tool_response().unwrap().clone())
            .collect();

        assert_eq!(responses[0].id, "a");
        assert_eq!(responses[0].tool_result, Ok(json!("first")));
        assert_eq!(responses[1].id, "b");
        // schema violation on one call does not affect its siblings
        assert!(matches!(responses[1].tool_result, Err(AgentError::InvalidParameters(_))));
        assert_eq!(responses[2].id, "c");
        assert_eq!(responses[2].tool_result, Ok(json!("third")));
        Ok(())
    }

    #[tokio::test]
    async fn test_budget_exhaustion_returns_fallback() -> anyhow::Result<()> {
        let provider = MockProvider::repeating(echo_call("again", "loop"));
        let agent = Agent::new(
            Box::new(provider.clone()),
            echo_registry(),
            AgentConfig::default(),
        )?;

        let outcome = agent.run("never stop").await?;
        assert!(outcome.is_aborted());
        assert_eq!(outcome.answer(), FALLBACK_MESSAGE);
        assert_eq!(outcome.steps, DEFAULT_MAX_STEPS);
        assert_eq!(provider.call_count(), DEFAULT_MAX_STEPS);
        Ok(())
    }

    #[tokio::test]
    async fn test_full_conversation_is_resent() -> anyhow::Result<()> {
        let provider = MockProvider::new(vec![
            echo_call("1", "ping"),
            Message::assistant().with_text("pong"),
        ]);
        let agent = Agent::new(
            Box::new(provider.clone()),
            echo_registry(),
            AgentConfig::default(),
        )?;
        agent.run("ping me").await?;

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].messages.len(), 2);
        assert_eq!(requests[1].messages.len(), 4);
        assert_eq!(requests[1].messages[..2], requests[0].messages[..]);
        assert_eq!(requests[1].tools.len(), 2);
        assert_eq!(requests[1].tool_choice, ToolChoice::Auto);
        Ok(())
    }

    #[tokio::test]
    async fn test_upstream_failure_ends_run() {
        let agent = agent_with(MockProvider::new(vec![echo_call("1", "x")]).with_failure("503"));
        let err = agent.run("fail on second call").await.unwrap_err();
        assert!(matches!(err, LoopError::Upstream(_)));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_run_with_history_appends_user_turn() -> anyhow::Result<()> {
        let agent = agent_with(MockProvider::new(vec![
            Message::assistant().with_text("first"),
            Message::assistant().with_text("second"),
        ]));

        let history = agent.run("one").await?.into_history();
        let outcome = agent.run_with_history(history, "two").await?;

        assert_eq!(outcome.answer(), "second");
        let texts: Vec<String> = outcome.conversation.iter().map(|m| m.text()).collect();
        assert_eq!(texts[1..], ["one", "first", "two"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_cancellation_stops_in_flight_tools() {
        let agent = agent_with(MockProvider::new(vec![Message::assistant()
            .with_content(MessageContent::tool_request("1", ToolCall::new("slow", json!({}))))]));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = agent
            .run_cancellable(agent.start("slow please"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, LoopError::Cancelled));
    }

    #[test]
    fn test_untranslatable_tool_rejected_at_construction() {
        let registry = ToolRegistry::new("test")
            .with_tool(
                Tool::new(
                    "pick",
                    "",
                    json!({"type": "object", "properties": {"choice": {"oneOf": [{"type": "string"}, {"type": "integer"}]}}}),
                ),
                FnHandler(|_args: Value| -> AgentResult<Value> { Ok(Value::Null) }),
            )
            .unwrap();
        let result = Agent::new(
            Box::new(MockProvider::new(vec![])),
            Arc::new(registry),
            AgentConfig::default(),
        );
        assert!(matches!(result, Err(RegistryError::SchemaTranslation { .. })));
    }

    #[test]
    fn test_zero_step_budget_rejected() {
        let result = Agent::new(
            Box::new(MockProvider::new(vec![])),
            Arc::new(ToolRegistry::new("empty")),
            AgentConfig {
                max_steps: 0,
                ..AgentConfig::default()
            },
        );
        assert!(matches!(result, Err(RegistryError::ZeroStepBudget)));
    }
}
