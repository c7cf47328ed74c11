use clap::Parser;
use log::{error, info};
use server::network::Server;
use shared::MatchConfig;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// Tick rate (updates per second)
    #[clap(short, long, default_value = "60")]
    tick_rate: u32,
    /// TOML file with match parameters
    #[clap(short, long)]
    config: Option<PathBuf>,
    /// Overrides `score_to_win` from the config file
    #[clap(long)]
    score_to_win: Option<u32>,
    /// Overrides `base_speed` from the config file
    #[clap(long)]
    base_speed: Option<f32>,
}

impl Args {
    fn match_config(&self) -> Result<MatchConfig, shared::ConfigError> {
        let mut config = match &self.config {
            Some(path) => MatchConfig::load(path)?,
            None => MatchConfig::default(),
        };
        if let Some(score_to_win) = self.score_to_win {
            config.score_to_win = score_to_win;
        }
        if let Some(base_speed) = self.base_speed {
            config.base_speed = base_speed;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = match args.match_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid match configuration: {}", e);
            std::process::exit(1);
        }
    };

    let tick_rate = args.tick_rate.max(1);
    let tick_duration = Duration::from_secs_f64(1.0 / tick_rate as f64);
    let address = format!("{}:{}", args.host, args.port);

    info!(
        "Starting match server on {} at {}Hz (first to {})",
        address, tick_rate, config.score_to_win
    );

    let server = Server::new(&address, tick_duration, config).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
