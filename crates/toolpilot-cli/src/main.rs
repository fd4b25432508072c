use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tracing::info;
use tracing_subscriber::EnvFilter;

use toolpilot::agent::Agent;
use toolpilot::bridge::tools_to_openai_spec;
use toolpilot::builtin;
use toolpilot::mcp::connect_in_process;
use toolpilot::providers::base::ToolCalling;
use toolpilot::providers::factory::{get_provider, with_tool_calling, ProviderType};
use toolpilot::registry::Toolbox;

mod configuration;
mod error;
mod render;
mod session;

use configuration::Settings;
use session::Interrupt;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a TOML config file (defaults to <config dir>/toolpilot/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Completion provider: openai, groq or ollama
    #[arg(short, long, global = true)]
    provider: Option<ProviderType>,

    /// Model to use
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Tool calling style: native, or prompted for endpoints without function calling
    #[arg(long, global = true)]
    tool_calling: Option<ToolCalling>,

    /// Tool dispatch rounds allowed before giving up
    #[arg(long, global = true)]
    max_steps: Option<usize>,

    /// Discover and call tools through the in-process MCP server
    #[arg(long, global = true)]
    mcp: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Answer one question, showing each tool call along the way
    Ask {
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },
    /// Chat interactively, keeping history across turns
    Chat,
    /// List the available tools
    Tools {
        /// Print the function specs sent to the provider
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// Flags win over file and environment settings
    fn apply(&self, settings: &mut Settings) {
        if let Some(kind) = self.provider {
            if kind != settings.provider.kind {
                // host and model defaults belong to the provider being replaced
                settings.provider.host = None;
                settings.provider.model = None;
                settings.provider.api_key = None;
            }
            settings.provider.kind = kind;
        }
        if let Some(model) = &self.model {
            settings.provider.model = Some(model.clone());
        }
        if let Some(mode) = self.tool_calling {
            settings.provider.tool_calling = mode;
        }
        if let Some(max_steps) = self.max_steps {
            settings.agent.max_steps = max_steps;
        }
        if self.mcp {
            settings.tools.via_mcp = true;
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn build_toolbox(via_mcp: bool) -> Result<Arc<dyn Toolbox>> {
    let local: Arc<dyn Toolbox> = Arc::new(builtin::registry()?);
    if !via_mcp {
        return Ok(local);
    }
    let remote = connect_in_process(local)
        .await
        .context("failed to connect to the in-process MCP server")?;
    Ok(Arc::new(remote))
}

fn build_agent(settings: Settings, toolbox: Arc<dyn Toolbox>) -> Result<Agent> {
    let mode = settings.provider.tool_calling;
    let provider = with_tool_calling(get_provider(settings.provider.into_config()?)?, mode);
    Ok(Agent::new(provider, toolbox, settings.agent.into_config())?)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;
    cli.apply(&mut settings);
    info!(provider = %settings.provider.kind, via_mcp = settings.tools.via_mcp, "starting");

    let toolbox = build_toolbox(settings.tools.via_mcp).await?;

    match &cli.command {
        Command::Tools { json } => {
            if *json {
                let specs = tools_to_openai_spec(toolbox.tools())?;
                println!("{}", serde_json::to_string_pretty(&specs)?);
            } else {
                render::render_tools(toolbox.tools());
            }
        }
        Command::Ask { question } => {
            let agent = build_agent(settings, toolbox)?;
            let interrupt = Interrupt::install()?;
            session::ask(&agent, &interrupt, &question.join(" ")).await?;
        }
        Command::Chat => {
            let agent = build_agent(settings, toolbox)?;
            let interrupt = Interrupt::install()?;
            session::chat(&agent, &interrupt).await?;
        }
    }
    Ok(())
}
