use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use wiretap_store::ProjectPaths;

mod commands;

#[derive(Parser)]
#[command(name = "wiretap", version, about = "Capture API traffic and track the specification it implies")]
struct Cli {
    #[arg(
        long,
        default_value = ".",
        help = "Project root directory (contains wiretap.yml)"
    )]
    project_root: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Write a starter wiretap.yml")]
    Init {
        #[arg(long, help = "API name (defaults to the directory name)")]
        name: Option<String>,
    },
    #[command(about = "Proxy traffic to the service and record every interaction")]
    Capture,
    #[command(about = "Serve the local API spec UI")]
    Spec {
        #[arg(long, help = "Do not open a browser window")]
        no_browser: bool,
    },
    #[command(about = "List capture sessions, newest first")]
    Sessions,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_root = std::path::absolute(&cli.project_root)
        .with_context(|| format!("resolving {}", cli.project_root.display()))?;
    let paths = ProjectPaths::new(&project_root);

    std::fs::create_dir_all(&paths.logs_dir)?;
    let file_appender = tracing_appender::rolling::daily(&paths.logs_dir, "wiretap.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .init();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    match command {
        Commands::Init { name } => commands::init(&paths, name.as_deref())?,
        Commands::Capture => {
            if let Some(config) = commands::load_or_setup(&paths)? {
                commands::capture::run(&paths, &config).await?;
            }
        }
        Commands::Spec { no_browser } => {
            if let Some(config) = commands::load_or_setup(&paths)? {
                commands::spec::run(&paths, &config, !no_browser).await?;
            }
        }
        Commands::Sessions => commands::sessions(&paths).await?,
    }

    Ok(())
}
