mod app;
mod cache;
mod config;
mod error;
mod fs_scan;
mod hashing;
mod logging;
mod paths;
mod reconcile;
mod transcribe;
mod types;

#[cfg(test)]
mod test_support;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Incremental speech-to-text over audio folders")]
struct Cli {
    #[arg(long, default_value = "transcription_config.json")]
    config: PathBuf,

    #[arg(long, default_value = "transcription_cache.json")]
    cache: PathBuf,

    /// Trả lời "yes" khi được hỏi xoá cache
    #[arg(long, short = 'y')]
    yes: bool,

    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show which files would be transcribed, without touching the cache
    Plan,
    /// Transcribe every stale file
    Run {
        #[arg(long, default_value = "whisper")]
        whisper: String,
        #[arg(long, default_value = "tiny.en")]
        model: String,
        #[arg(long)]
        language: Option<String>,
    },
    /// Show drift between config and cache
    Status,
    /// Drop the cached history of a directory that is no longer configured
    Forget { input_root: PathBuf },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.log_file.as_deref()) {
        eprintln!("WARNING: logging disabled: {e}");
    }

    let cfg = app::AppConfig {
        config_path: cli.config,
        cache_path: cli.cache,
        assume_yes: cli.yes,
    };

    match cli.cmd {
        Commands::Plan => app::plan(&cfg)?,
        Commands::Run {
            whisper,
            model,
            language,
        } => {
            let engine = app::EngineOptions {
                program: whisper,
                model,
                language,
            };
            app::run(&cfg, &engine)?;
        }
        Commands::Status => app::status(&cfg)?,
        Commands::Forget { input_root } => app::forget(&cfg, &input_root)?,
    }

    Ok(())
}
