use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "docrelay")]
#[command(about = "Messenger webhook relay to a document-QA service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the webhook gateway (GET /, GET /webhook, POST /webhook).
    Gateway {
        /// Config file path (default: DOCRELAY_CONFIG_PATH or ~/.docrelay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from PORT, config, or 2000)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Run one question through the QA and rewrite steps and print the reply (nothing is sent).
    Ask {
        /// Config file path (default: DOCRELAY_CONFIG_PATH or ~/.docrelay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Skip the LLM rewrite step and print the QA answer as-is.
        #[arg(long)]
        no_rewrite: bool,

        /// The question to ask.
        text: String,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("docrelay {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Gateway { config, port }) => {
            if let Err(e) = run_gateway(config, port).await {
                log::error!("gateway failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Ask {
            config,
            no_rewrite,
            text,
        }) => {
            if let Err(e) = run_ask(config, no_rewrite, &text).await {
                log::error!("ask failed: {:#}", e);
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
    let (mut config, path) = lib::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!(
        "starting gateway on {}:{} (config {})",
        config.gateway.bind,
        config.gateway.port,
        path.display()
    );
    lib::gateway::run_gateway(config).await
}

async fn run_ask(
    config_path: Option<std::path::PathBuf>,
    no_rewrite: bool,
    text: &str,
) -> anyhow::Result<()> {
    let (mut config, _) = lib::config::load_config(config_path)?;
    if no_rewrite {
        config.dispatch.rewrite_enabled = false;
    }
    let dispatcher = lib::gateway::build_dispatcher(&config);
    match dispatcher.answer(text).await {
        Ok(Some(reply)) => {
            println!("{}", reply);
            Ok(())
        }
        Ok(None) => {
            println!("(no answer)");
            Ok(())
        }
        Err((stage, e)) => Err(anyhow::anyhow!("{} step failed: {}", stage, e)),
    }
}
