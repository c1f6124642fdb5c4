use clap::Parser;
use poly_pulse::cli::{Cli, Commands};
use poly_pulse::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
        eprintln!("Using default configuration");
        toml::from_str(include_str!("../config.toml.example")).expect("Invalid default config")
    });

    // Initialize telemetry
    poly_pulse::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            args.execute(config).await?;
        }
        Commands::Status => {
            println!("poly-pulse status");
            println!("  Mode: Paper Trading");
            println!("  Status: Not running");
        }
        Commands::Config => {
            println!("Current configuration:");
            println!("  Feed: {} {}", config.feed.ws_url, config.feed.product_id);
            println!("  Gamma: {}", config.market.gamma_url);
            println!(
                "  Ensemble: min_edge={}, min_confidence={}",
                config.ensemble.min_edge, config.ensemble.min_confidence
            );
            println!(
                "  Positions: bet=${}, max_open={}, horizon={}s",
                config.position.bet_usd, config.position.max_open, config.position.horizon_secs
            );
        }
    }

    Ok(())
}
