use clap::{Parser, Subcommand};

/// Self-service dashboard backend for a New API gateway
#[derive(Parser)]
#[command(name = "dashboard", version, about)]
pub struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "DASHBOARD_LOG_JSON")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the dashboard API server
    Serve {
        /// Port to bind (overrides DASHBOARD_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
}
