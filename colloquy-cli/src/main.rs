//! Colloquy CLI - run agent conversations against a hosted agent service

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use colloquy_core::prelude::*;

#[derive(Parser)]
#[command(name = "colloquy")]
#[command(about = "Multi-agent conversations on hosted agents", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./colloquy.toml plus environment)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

/// Command-line settings that win over file and environment configuration
#[derive(Args, Debug, Default)]
struct Overrides {
    /// Agent service project endpoint
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Maximum agent turns per group chat
    #[arg(long, global = true)]
    max_iterations: Option<usize>,

    /// Only these agents' turns can approve (repeatable)
    #[arg(long = "approver", global = true)]
    approvers: Vec<String>,

    #[arg(long, global = true)]
    web_search_agent: Option<String>,

    #[arg(long, global = true)]
    writer_agent: Option<String>,

    #[arg(long, global = true)]
    critique_agent: Option<String>,
}

impl Overrides {
    fn apply(self, config: &mut ColloquyConfig) {
        if let Some(endpoint) = self.endpoint {
            config.service.endpoint = Some(endpoint);
        }
        if let Some(max) = self.max_iterations {
            config.chat.maximum_iterations = max;
        }
        if !self.approvers.is_empty() {
            config.chat.approvers = self.approvers;
        }
        if let Some(id) = self.web_search_agent {
            config.agents.web_search = Some(id);
        }
        if let Some(id) = self.writer_agent {
            config.agents.blog_writer = Some(id);
        }
        if let Some(id) = self.critique_agent {
            config.agents.blog_critique = Some(id);
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the web search agent, then hand its answer to writer and critique
    Handoff {
        #[arg(long, default_value = OCEAN_TASK)]
        task: String,
    },
    /// Let all three agents work on the task in one group chat
    GroupChat {
        #[arg(long, default_value = SKY_TASK)]
        task: String,
    },
    /// Agent inspection commands
    Agent {
        #[command(subcommand)]
        command: AgentCommands,
    },
    /// Version information
    Version,
}

#[derive(Subcommand)]
enum AgentCommands {
    /// Show a remote agent definition
    Show {
        /// Agent ID
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so the transcript owns stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Version = cli.command {
        println!("colloquy {}", env!("CARGO_PKG_VERSION"));
        println!("colloquy-core {}", colloquy_core::VERSION);
        return Ok(());
    }

    let config = load_config(cli.config.as_deref(), cli.overrides)?;
    let service = connect(&config).await?;

    match cli.command {
        Commands::Handoff { task } => {
            let agents = ScenarioAgents::fetch(service.clone(), &config.agents).await?;
            let driver = ConversationDriver::new(service, config.chat.clone());
            let report = driver
                .run_handoff(
                    &Task::new(task),
                    agents.web_search.clone(),
                    agents.blog_writer.clone(),
                    agents.blog_critique.clone(),
                    &mut WriterTranscript::stdout(),
                )
                .await?;
            print_outcome(&report.outcome);
        }
        Commands::GroupChat { task } => {
            let agents = ScenarioAgents::fetch(service.clone(), &config.agents).await?;
            let driver = ConversationDriver::new(service, config.chat.clone());
            let report = driver
                .run_group_chat(&Task::new(task), agents.all(), &mut WriterTranscript::stdout())
                .await?;
            print_outcome(&report.outcome);
        }
        Commands::Agent { command } => match command {
            AgentCommands::Show { id } => {
                let definition = service.get_agent(&id).await?;
                println!("{}", serde_json::to_string_pretty(&definition)?);
            }
        },
        Commands::Version => {}
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>, overrides: Overrides) -> Result<ColloquyConfig> {
    let mut config = match path {
        Some(path) => ColloquyConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => ColloquyConfig::load()?,
    };
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}

async fn connect(config: &ColloquyConfig) -> Result<Arc<dyn AgentService>> {
    let credential = authenticate().await?;
    let service = AzureAgentService::new(&config.service, credential)?;
    tracing::info!(endpoint = service.endpoint(), "Connected to agent service");
    Ok(Arc::new(service))
}

fn print_outcome(outcome: &ChatOutcome) {
    match outcome {
        ChatOutcome::Approved { by } => println!("# Outcome: approved by {}", by),
        ChatOutcome::IterationLimit { iterations } => {
            println!("# Outcome: stopped after {} turns without approval", iterations)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_handoff_defaults() {
        let cli = Cli::try_parse_from(["colloquy", "handoff"]).unwrap();
        match cli.command {
            Commands::Handoff { task } => assert_eq!(task, OCEAN_TASK),
            _ => panic!("expected handoff"),
        }
    }

    #[test]
    fn test_parse_group_chat_with_overrides() {
        let cli = Cli::try_parse_from([
            "colloquy",
            "group-chat",
            "--task",
            "Why is grass green?",
            "--max-iterations",
            "4",
            "--approver",
            "BlogCritique",
            "--approver",
            "Editor",
        ])
        .unwrap();

        assert_eq!(cli.overrides.max_iterations, Some(4));
        assert_eq!(cli.overrides.approvers, vec!["BlogCritique", "Editor"]);
        match cli.command {
            Commands::GroupChat { task } => assert_eq!(task, "Why is grass green?"),
            _ => panic!("expected group-chat"),
        }
    }

    #[test]
    fn test_parse_agent_show() {
        let cli = Cli::try_parse_from(["colloquy", "agent", "show", "asst_123"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Agent {
                command: AgentCommands::Show { id }
            } if id == "asst_123"
        ));
    }

    #[test]
    fn test_overrides_apply() {
        let mut config = ColloquyConfig::default();
        Overrides {
            endpoint: Some("https://example.services.ai.azure.com/api/projects/p".to_string()),
            max_iterations: Some(3),
            approvers: vec!["BlogCritique".to_string()],
            web_search_agent: Some("asst_s".to_string()),
            writer_agent: None,
            critique_agent: Some("asst_c".to_string()),
        }
        .apply(&mut config);

        assert_eq!(config.chat.maximum_iterations, 3);
        assert_eq!(config.chat.approvers, vec!["BlogCritique"]);
        assert_eq!(config.agents.web_search.as_deref(), Some("asst_s"));
        assert!(config.agents.blog_writer.is_none());
        assert_eq!(config.agents.blog_critique.as_deref(), Some("asst_c"));
        assert!(config.service.endpoint.is_some());
    }

    #[test]
    fn test_empty_overrides_keep_config() {
        let mut config = ColloquyConfig::default();
        Overrides::default().apply(&mut config);
        assert_eq!(config.chat.maximum_iterations, DEFAULT_MAXIMUM_ITERATIONS);
        assert!(config.chat.approvers.is_empty());
    }
}
