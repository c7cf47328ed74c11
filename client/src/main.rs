use clap::Parser;
use client::input::{AxisSource, ScriptedAxis, TrackingAxis};
use client::network::{Client, SessionOptions};
use log::{error, info};
use shared::MatchConfig;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// TOML file with match parameters (must match the server's)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// How eagerly the paddle follows the ball
    #[arg(short = 't', long, default_value = "2.0")]
    tracking_speed: f32,

    /// Comma separated axis values to replay instead of tracking the ball
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    script: Vec<f32>,

    /// Quit the session after this many matches
    #[arg(short, long)]
    matches: Option<u32>,

    /// Do not vote for a rematch automatically
    #[arg(long)]
    no_replay: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match MatchConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                error!("Invalid match configuration: {}", e);
                std::process::exit(1);
            }
        },
        None => MatchConfig::default(),
    };

    let source: Box<dyn AxisSource> = if args.script.is_empty() {
        Box::new(TrackingAxis::new(args.tracking_speed))
    } else {
        Box::new(ScriptedAxis::new(args.script.clone()))
    };

    let options = SessionOptions {
        auto_replay: !args.no_replay,
        max_matches: args.matches,
    };

    info!("Starting client...");
    let mut client = Client::new(&args.server, &config, source, options).await?;

    tokio::select! {
        result = client.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, leaving the match");
        }
    }
    client.disconnect().await?;

    Ok(())
}
