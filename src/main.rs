use clap::{Parser, Subcommand};
use duck_agents::agents::runtime;
use duck_agents::config::Settings;
use duck_agents::error::Result;
use duck_agents::{hub, supervisor};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Duck market-intelligence agent fleet
#[derive(Parser, Debug)]
#[command(name = "duck-agents")]
#[command(author, version, about = "Autonomous market-intelligence agents for the Duck token")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the hub (REST ingress + socket fan-out + analysis loop)
    Hub {
        /// Listen port (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run a single agent variant
    Agent {
        /// One of: trading, prediction, market, whale, liquidity,
        /// sentiment, onchain, gas
        name: String,
    },
    /// Launch and babysit the whole fleet (or one agent, with no delay)
    Supervise {
        /// Optional single agent to run
        agent: Option<String>,
    },
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Hub { port } => {
            let mut settings = Settings::from_env()?;
            if let Some(port) = port {
                settings.hub_port = port;
            }
            hub::run(settings).await
        }
        Commands::Agent { name } => {
            let settings = Settings::from_env()?;
            if let Err(e) = runtime::run_agent(&name, settings).await {
                error!(agent = %name, error = %e, "agent failed");
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Supervise { agent } => supervisor::run(agent.as_deref()).await,
    }
}
