//! `clipd` CLI - Serve the clip API or cut clips from the command line

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use clipd::ServiceConfig;

mod cmd;

#[derive(Parser)]
#[command(name = "clipd")]
#[command(about = "Cut short MP4 clips out of hosted episode videos")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.config/clipd/config.toml)
    #[arg(short, long, global = true, env = "CLIPD_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Listen address, overrides the config file
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Cut one clip and save it locally
    Clip {
        /// File id, folder id, or share link
        source: String,

        /// Start time (MM:SS or HH:MM:SS)
        start: String,

        /// End time (MM:SS or HH:MM:SS)
        end: String,

        /// Treat the source as a folder and search it for an .mp4
        #[arg(short, long)]
        folder: bool,

        /// Output file
        #[arg(short, long, default_value = "clip.mp4")]
        output: PathBuf,
    },

    /// List the configured episodes
    Episodes {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (stderr, so `episodes --json` stays pipeable)
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let config = ServiceConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { bind } => {
            cmd::serve::cmd_serve(config, bind).await?;
        }
        Commands::Clip {
            source,
            start,
            end,
            folder,
            output,
        } => {
            cmd::clip::cmd_clip(&config, &source, folder, &start, &end, &output).await?;
        }
        Commands::Episodes { json } => {
            cmd::episodes::cmd_episodes(&config, json)?;
        }
    }

    Ok(())
}
