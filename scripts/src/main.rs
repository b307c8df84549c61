use clap::Parser;
use raffle_scripts::{cli::Cli, errors::ScriptError};

#[tokio::main]
async fn main() -> Result<(), ScriptError> {
    tracing_subscriber::fmt().pretty().init();

    Cli::parse().run().await
}
