use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "quiesce")]
#[command(about = "Replay resource open/close notifications through a quiescence barrier")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Feed a TOML event script through a barrier, then wait for quiescence
    Replay {
        /// Script with [[events]] entries
        script: PathBuf,

        /// Config file path
        #[arg(short, long, default_value = "quiesce.toml")]
        config: PathBuf,

        /// Override barrier.wait_timeout_ms
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Skip the final wait
        #[arg(long)]
        no_wait: bool,

        /// Force-close whatever is still open after the wait
        #[arg(long)]
        force_close: bool,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}
