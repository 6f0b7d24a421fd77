use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use std::sync::Arc;
use stride_core::{
    AgentMode, AgentOrchestrator, AgentStep, ChatMessage, OpenAiCaller, StepPayload, ToolRegistry,
    config,
};
use tokio_stream::StreamExt;

const OBSERVATION_PREVIEW_CHARS: usize = 200;

#[derive(Parser)]
#[command(name = "stride")]
#[command(about = "stride - stepwise agent loop over any OpenAI-compatible model", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file to ~/.stride/config.toml
    Init,
    /// List the tools known to the shared registry
    Tools,
    /// Run one agent session and stream its steps
    Run {
        #[arg(short, long)]
        message: String,
        /// Reasoning mode: plan_act or react
        #[arg(long)]
        mode: Option<String>,
        #[arg(long)]
        max_steps: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            if config::config_exists() {
                println!(
                    "Config already exists at {}",
                    config::get_config_path().display()
                );
            } else {
                config::save_config(&config::Config::default())?;
                println!("Wrote {}", config::get_config_path().display());
                println!("Set api_key (and optionally base_url/model) before running.");
            }
        }
        Commands::Tools => {
            let registry = ToolRegistry::new();
            for descriptor in registry.descriptors() {
                println!(
                    "{}  {}",
                    style(&descriptor.name).cyan(),
                    descriptor.description
                );
            }
        }
        Commands::Run {
            message,
            mode,
            max_steps,
        } => {
            run_session(message, mode, max_steps).await?;
        }
    }

    Ok(())
}

async fn run_session(message: String, mode: Option<String>, max_steps: Option<usize>) -> Result<()> {
    let cfg = config::load_config()?;

    let mut caller = OpenAiCaller::new(cfg.api_key.clone()).with_model(cfg.model.clone());
    if let Some(base_url) = cfg.base_url.clone() {
        caller = caller.with_base_url(base_url);
    }

    let registry = Arc::new(ToolRegistry::new());
    let orchestrator = AgentOrchestrator::new(Arc::new(caller), registry.clone());

    let mut agent_config = cfg.agent_config(registry.descriptors());
    if let Some(mode) = mode {
        agent_config.mode = parse_mode(&mode)?;
    }
    if let Some(max_steps) = max_steps {
        agent_config.max_steps = max_steps;
    }
    let stream_steps = agent_config.stream_steps;

    let mut stream = orchestrator.run(agent_config, vec![ChatMessage::user(&message)]);

    while let Some(item) = stream.next().await {
        match item {
            Ok(step) => {
                if stream_steps || step.is_final() {
                    render_step(&step);
                }
            }
            Err(err) => {
                eprintln!("{} {}", style("✗").red(), err);
                anyhow::bail!("Agent run failed: {}", err);
            }
        }
    }

    Ok(())
}

fn parse_mode(mode: &str) -> Result<AgentMode> {
    match mode {
        "plan_act" => Ok(AgentMode::PlanAct),
        "react" => Ok(AgentMode::React),
        other => anyhow::bail!("Unknown mode '{}', expected plan_act or react", other),
    }
}

fn render_step(step: &AgentStep) {
    match &step.payload {
        StepPayload::Thought { thought } => {
            if let Some(thought) = thought {
                println!("💭 {}", style(thought).dim());
            }
        }
        StepPayload::ToolCall { thought, tool_call } => {
            if let Some(thought) = thought {
                println!("💭 {}", style(thought).dim());
            }
            println!(
                "🔧 {} {}",
                style(&tool_call.tool_name).cyan(),
                style(tool_call.arguments.to_string()).dim()
            );
        }
        StepPayload::Observation {
            tool_name, output, ..
        } => {
            if let Some(output) = output {
                println!(
                    "👁  {} → {}",
                    tool_name,
                    preview(&output.to_string(), OBSERVATION_PREVIEW_CHARS)
                );
            }
        }
        StepPayload::Final { final_answer, .. } => {
            if !final_answer.is_empty() {
                println!("\n{}", final_answer);
            }
        }
    }

    if let Some(error) = &step.error {
        eprintln!("{} {}", style("!").yellow(), style(error).yellow());
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{}...", truncated)
}
