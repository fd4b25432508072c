use serde_json::Value;

use crate::errors::AgentResult;
use crate::models::conversation::Conversation;
use crate::models::message::{Message, ToolRequest};

/// Reply used when the step budget runs out before the model answers
pub const FALLBACK_MESSAGE: &str = "Sorry, I couldn't complete the task.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    AwaitingModel,
    DispatchingTools,
    Done,
    Aborted,
}

impl LoopPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopPhase::Done | LoopPhase::Aborted)
    }
}

/// How a loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStatus {
    /// The model produced a plain answer
    Done,
    /// The step budget was exhausted and the fallback reply was produced
    Aborted,
}

/// The result of one agentic run
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub status: LoopStatus,
    /// The concluding assistant message, not part of `conversation`
    pub reply: Message,
    /// Everything sent to the model during the run
    pub conversation: Conversation,
    /// Number of completed tool dispatch rounds
    pub steps: usize,
}

impl LoopOutcome {
    pub fn answer(&self) -> String {
        self.reply.text()
    }

    pub fn is_aborted(&self) -> bool {
        self.status == LoopStatus::Aborted
    }

    /// The conversation with the reply appended, ready to seed the next turn
    pub fn into_history(self) -> Conversation {
        let mut conversation = self.conversation;
        conversation.push(self.reply);
        conversation
    }
}

/// State owned by a single in-flight run
#[derive(Debug)]
pub struct LoopState {
    conversation: Conversation,
    phase: LoopPhase,
    steps: usize,
    budget: usize,
    reply: Option<Message>,
}

impl LoopState {
    pub fn new(conversation: Conversation, budget: usize) -> Self {
        Self {
            conversation,
            phase: LoopPhase::AwaitingModel,
            steps: 0,
            budget,
            reply: None,
        }
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Take the model's response. A response carrying tool requests is appended
    /// and moves the loop to dispatching; anything else ends the loop.
    pub fn accept_response(&mut self, response: Message) -> LoopPhase {
        debug_assert_eq!(self.phase, LoopPhase::AwaitingModel);

        if response.has_tool_requests() {
            self.conversation.push(response);
            self.phase = LoopPhase::DispatchingTools;
        } else {
            self.reply = Some(response);
            self.phase = LoopPhase::Done;
        }
        self.phase
    }

    /// The requests of the assistant message currently being dispatched
    pub fn pending_requests(&self) -> Vec<ToolRequest> {
        if self.phase != LoopPhase::DispatchingTools {
            return Vec::new();
        }
        self.conversation
            .last()
            .map(|message| message.tool_requests().into_iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Append one tool message per pending request, in request order, and
    /// count the step. Returns the appended messages.
    pub fn accept_results(&mut self, results: Vec<AgentResult<Value>>) -> Vec<Message> {
        debug_assert_eq!(self.phase, LoopPhase::DispatchingTools);

        let requests = self.pending_requests();
        debug_assert_eq!(requests.len(), results.len());

        let appended: Vec<Message> = requests
            .into_iter()
            .zip(results)
            .map(|(request, result)| Message::tool_result(request.id, result))
            .collect();
        self.conversation.extend(appended.iter().cloned());

        self.steps += 1;
        if self.steps >= self.budget {
            self.reply = Some(Message::assistant().with_text(FALLBACK_MESSAGE));
            self.phase = LoopPhase::Aborted;
        } else {
            self.phase = LoopPhase::AwaitingModel;
        }
        appended
    }

    pub fn into_outcome(self) -> LoopOutcome {
        let status = match self.phase {
            LoopPhase::Aborted => LoopStatus::Aborted,
            _ => LoopStatus::Done,
        };
        LoopOutcome {
            status,
            reply: self.reply.unwrap_or_else(Message::assistant),
            conversation: self.conversation,
            steps: self.steps,
        }
    }
}
