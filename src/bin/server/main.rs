//! OAR Forms server and CLI
//!
//! Extracts key-value fields from scanned form images, either from the command line
//! or behind an HTTP endpoint.
//!
//! # Usage
//!
//! ## CLI Mode
//! ```bash
//! oar-forms-server --config config/config.toml process --path scans/
//! oar-forms-server process --path scans/a.png --path scans/b.png --imp
//! ```
//!
//! ## Server Mode
//! ```bash
//! oar-forms-server --config config/config.toml serve --port 5000
//! curl "http://localhost:5000/process_images?folderPath=/data/scans&imp=0"
//! ```
//!
//! ## Worker Mode
//! Started by the batch runner for process isolation; prints the fields of one image
//! as JSON on stdout.
//! ```bash
//! oar-forms-server worker --image scans/a.png
//! ```

mod cache;
mod cli;
mod config;
mod server;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "oar-forms-server")]
#[command(author = "OAR Forms Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Form key-value extraction via CLI or HTTP server", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(
        long,
        global = true,
        env = "OAR_FORMS_CONFIG",
        default_value = "config/config.toml"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract fields from an image file or every image under a folder
    Process {
        /// Image file or folder; repeat to process an explicit list of images
        #[arg(long, required = true)]
        path: Vec<PathBuf>,

        /// Read the images under the configured impersonation account
        #[arg(long)]
        imp: bool,

        /// Output format
        #[arg(long, value_enum, default_value_t = cli::OutputFormat::Pretty)]
        output: cli::OutputFormat,
    },
    /// Start the HTTP server
    Serve {
        /// Host to bind to (overrides `server.host`)
        #[arg(long, env = "OAR_FORMS_HOST")]
        host: Option<String>,

        /// Port to listen on (overrides `server.port`)
        #[arg(long, short, env = "OAR_FORMS_PORT")]
        port: Option<u16>,
    },
    /// Process one image and print its fields as JSON
    Worker {
        /// Image to process
        #[arg(long)]
        image: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    oar_forms::utils::init_tracing();

    let cli = Cli::parse();
    let mut app = config::AppConfig::load(&cli.config)?;

    match cli.command {
        Commands::Process { path, imp, output } => {
            info!(paths = path.len(), impersonate = imp, "processing from command line");
            let app = app.clone();
            tokio::task::spawn_blocking(move || cli::process_paths(&app, &path, imp, output))
                .await??;
        }
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                app.form.server.host = host;
            }
            if let Some(port) = port {
                app.form.server.port = port;
            }
            info!(
                "Starting server on {}:{}",
                app.form.server.host, app.form.server.port
            );
            server::run_server(app).await?;
        }
        Commands::Worker { image } => {
            cli::run_worker(&app, &image)?;
        }
    }

    Ok(())
}
