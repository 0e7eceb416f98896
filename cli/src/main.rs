use clap::{Parser, Subcommand};

use ticktock_cli::{commands, logging};
use ticktock_core::{DemoConfig, DemoConfigExt};

#[derive(Parser)]
#[command(version, about = "Software timer service demo")]
struct Cli {
    /// Seconds to run the demo scenario before shutting down
    #[arg(long, global = true)]
    run_secs: Option<u64>,

    /// Warn when a callback runs longer than this (0 disables)
    #[arg(long, global = true)]
    slow_callback_ms: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the three-timer scenario (default)
    Run,
    /// Show the effective configuration
    Config,
    /// Store the effective configuration
    SaveConfig,
}

impl Cli {
    /// Command-line values override the stored configuration
    fn apply_overrides(&self, config: &mut DemoConfig) {
        if let Some(run_secs) = self.run_secs {
            config.run_secs = run_secs;
        }
        if let Some(slow_callback_ms) = self.slow_callback_ms {
            config.scheduler.slow_callback_warn_ms = slow_callback_ms;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), String> {
    logging::init();

    let cli = Cli::parse();
    let mut config = DemoConfig::load_or_default();
    cli.apply_overrides(&mut config);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => commands::run_demo(config).await,
        Commands::Config => {
            commands::show_config(&config);
            Ok(())
        }
        Commands::SaveConfig => commands::save_config(&config),
    }
}
