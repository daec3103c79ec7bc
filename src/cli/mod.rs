//! CLI interface for insight-relay
//!
//! Provides subcommands for:
//! - `serve`: Run the instrumented demo server
//! - `cache`: List batches waiting in the retry cache
//! - `config`: Show the effective configuration

mod cache;
mod serve;

pub use cache::CacheArgs;
pub use serve::{demo_router, ServeArgs};

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "insight-relay")]
#[command(about = "In-process telemetry capture and relay for axum services")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the instrumented demo server
    Serve(ServeArgs),
    /// List batches waiting in the retry cache
    Cache(CacheArgs),
    /// Show the effective configuration
    Config,
}
