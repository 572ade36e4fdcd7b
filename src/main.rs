use clap::Parser;
use duolens::cli::{self, Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Completions must not require a valid config or a reachable backend.
    if let Commands::Completions(args) = &cli.command {
        cli::handle_completions(args);
        return;
    }

    let config = match cli::load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    duolens::logging::init_logging(&config.logging);

    let result = match &cli.command {
        Commands::Watch(args) => cli::watch::run_watch(&config, args).await,
        Commands::Detect(args) => cli::detect::run_detect(&config, args).await,
        Commands::Analytics(args) => cli::analytics::run_analytics(&config, args).await,
        Commands::Completions(_) => unreachable!("handled above"),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
