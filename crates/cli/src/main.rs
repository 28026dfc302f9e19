use anyhow::{bail, Context, Result};
use clap::Parser;
use quiesce_cli::args::{Cli, Commands};
use quiesce_cli::replay::{self, ReplayOptions, ReplayScript};
use quiesce_cli::{completions, display};
use quiesce_common::tracing_setup::init_tracing;
use quiesce_common::QuiesceConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Completions { shell } => {
            completions::generate(shell);
        }
        Commands::Replay {
            script,
            config,
            timeout_ms,
            no_wait,
            force_close,
            json,
        } => {
            let config_found = config.exists();
            let mut config = if config_found {
                QuiesceConfig::from_file(&config)
                    .with_context(|| format!("Failed to load config {}", config.display()))?
            } else {
                QuiesceConfig::default()
            };
            if let Some(ms) = timeout_ms {
                config.barrier.wait_timeout_ms = Some(ms);
                config.validate()?;
            }

            init_tracing(&config.logging)?;
            if !config_found {
                tracing::warn!("Config file not found, using defaults");
            }

            let script = ReplayScript::from_file(&script)?;
            let options = ReplayOptions {
                wait: !no_wait,
                force_close,
            };
            let summary = replay::run(&script, &config, options).await?;

            if json {
                println!("{}", display::render_json(&summary)?);
            } else {
                print!("{}", display::render_text(&summary));
            }

            if !summary.quiescent {
                bail!("{} resource(s) still open", summary.remaining.len());
            }
        }
    }

    Ok(())
}
