use std::sync::{Arc, Mutex};

use anyhow::Result;
use cliclack::{input, spinner};
use console::style;
use futures::TryStreamExt;
use tokio_util::sync::CancellationToken;
use toolpilot::agent::{Agent, LoopEvent, LoopOutcome};
use toolpilot::errors::LoopError;
use toolpilot::models::conversation::Conversation;

use crate::render;

/// Routes Ctrl-C to whichever run is in flight
#[derive(Clone, Default)]
pub struct Interrupt {
    current: Arc<Mutex<CancellationToken>>,
}

impl Interrupt {
    /// Install the process-wide Ctrl-C handler
    pub fn install() -> Result<Self> {
        let interrupt = Self::default();
        let handle = interrupt.clone();
        ctrlc::set_handler(move || handle.fire())?;
        Ok(interrupt)
    }

    /// A fresh token for the next run
    pub fn arm(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current = token.clone();
        token
    }

    pub fn fire(&self) {
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cancel();
    }
}

/// Drive one run, rendering each step as it lands
async fn drive(
    agent: &Agent,
    conversation: Conversation,
    cancel: CancellationToken,
) -> Result<LoopOutcome, anyhow::Error> {
    let mut spin = spinner();
    spin.start("awaiting reply");

    let mut stream = agent.reply(conversation);
    loop {
        let event = tokio::select! {
            event = stream.try_next() => event,
            _ = cancel.cancelled() => {
                spin.error("interrupted");
                return Err(LoopError::Cancelled.into());
            }
        };
        match event {
            Ok(Some(LoopEvent::Message(message))) => {
                spin.stop("");
                render::render_step(&message)?;
                spin = spinner();
                spin.start("awaiting reply");
            }
            Ok(Some(LoopEvent::Finished(outcome))) => {
                spin.stop("");
                if outcome.is_aborted() {
                    println!(
                        "{}",
                        style(format!("stopped after {} steps", outcome.steps)).yellow()
                    );
                }
                return Ok(outcome);
            }
            Ok(None) => {
                spin.stop("");
                anyhow::bail!("agent stopped without an answer");
            }
            Err(e) => {
                spin.error("request failed");
                return Err(e.into());
            }
        }
    }
}

pub async fn ask(agent: &Agent, interrupt: &Interrupt, question: &str) -> Result<()> {
    let outcome = drive(agent, agent.start(question), interrupt.arm()).await?;
    render::render_answer(&outcome.answer())
}

/// Interactive chat. History carries across turns; an interrupted turn is
/// dropped and the history stays as it was before it.
pub async fn chat(agent: &Agent, interrupt: &Interrupt) -> Result<()> {
    println!(
        "toolpilot chat {}",
        style("- type \"exit\" to end the session").dim()
    );
    println!();

    let mut history = Conversation::new();
    loop {
        let text: String = match input("Message:").placeholder("").interact() {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => break,
            Err(e) => return Err(e.into()),
        };
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        if text.eq_ignore_ascii_case("exit") || text.eq_ignore_ascii_case("quit") {
            break;
        }

        let conversation = agent.follow_up(history.clone(), text);
        match drive(agent, conversation, interrupt.arm()).await {
            Ok(outcome) => {
                render::render_answer(&outcome.answer())?;
                history = outcome.into_history();
            }
            Err(e) => match e.downcast_ref::<LoopError>() {
                Some(LoopError::Cancelled) => continue,
                _ => eprintln!("{} {}", style("error:").red().bold(), e),
            },
        }
    }
    Ok(())
}
