//! Hello world provider and consumer on top of the service center client

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod hello;
mod signal;

#[derive(Parser)]
#[command(name = "helloworld")]
#[command(about = "Service center demo - registers a provider or calls one")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, default_value = "./conf/microservice.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve /hello and stay registered until SIGINT/SIGTERM
    Provider,

    /// Discover the provider and call its /hello
    Consumer {
        /// Keep watching the provider and calling it until SIGINT/SIGTERM
        #[arg(short, long)]
        watch: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Provider => commands::provider::run(&cli.config).await,
        Commands::Consumer { watch } => commands::consumer::run(&cli.config, watch).await,
    }
}
