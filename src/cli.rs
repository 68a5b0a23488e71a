use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to a YAML config file
    #[arg(short, long, env = "LAUNCHER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Run migrations, report their result and exit
    #[arg(long, conflicts_with = "skip_migrations")]
    pub migrate_only: bool,

    /// Do not attempt migrations on this start
    #[arg(long)]
    pub skip_migrations: bool,

    /// Command to hand off to; falls back to handoff.command from the config
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}
