use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "whatsgpt")]
#[command(about = "WhatsGPT CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the webhook gateway. Environment (and a .env file in the working directory) overrides the config file.
    Gateway {
        /// Config file path (default: WHATSGPT_CONFIG_PATH or ~/.whatsgpt/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from PORT, config, or 8080)
        #[arg(long, short)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    let dotenv = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Ok(path) = dotenv {
        log::debug!("loaded environment from {}", path.display());
    }

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("whatsgpt {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Gateway { config, port }) => {
            if let Err(e) = run_gateway(config, port).await {
                log::error!("gateway failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

async fn run_gateway(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, path) = whatsgpt::config::load_config(config_path)?;
    if let Some(p) = port {
        config.server.port = p;
    }
    log::info!(
        "starting gateway on {}:{} (config {})",
        config.server.bind,
        config.server.port,
        path.display()
    );
    whatsgpt::gateway::run_gateway(config).await
}
