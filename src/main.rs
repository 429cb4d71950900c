use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use terratone::config::AppConfig;
use terratone::pipeline;

#[derive(Parser)]
#[command(name = "terratone", version, about = "Satellite imagery sonification")]
struct Cli {
    /// Path to the TOML config file (default: XDG config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the output directory from the config
    #[arg(short, long, global = true)]
    output_dir: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract indices, aggregate scanline frames and write score.json
    Score {
        /// Raw scene directory (overrides config raw_dir)
        #[arg(long)]
        raw_dir: Option<PathBuf>,

        /// Continue past failed scenes, leaving silent gaps in the score
        #[arg(long)]
        skip_failed: bool,
    },

    /// Convert a persisted score to a standard MIDI file
    Midi {
        /// Score file (default: <output_dir>/score.json)
        #[arg(long)]
        score: Option<PathBuf>,
    },

    /// Synthesize audio and render the synchronized video
    Render {
        /// Score file (default: <output_dir>/score.json)
        #[arg(long)]
        score: Option<PathBuf>,

        /// Fail instead of falling back to oscillator synthesis
        #[arg(long)]
        no_fallback: bool,
    },

    /// Run the whole pipeline: score, midi, render
    Run {
        #[arg(long)]
        raw_dir: Option<PathBuf>,

        #[arg(long)]
        skip_failed: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let mut config = AppConfig::load(cli.config.as_deref());
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }

    match cli.command {
        Commands::Score {
            raw_dir,
            skip_failed,
        } => {
            if let Some(dir) = raw_dir {
                config.raw_dir = dir;
            }
            config.skip_failed_scenes |= skip_failed;
            let path = pipeline::run_score(&config).context("Score generation failed")?;
            println!("Score written to {}", path.display());
        }

        Commands::Midi { score } => {
            let path = pipeline::run_midi(&config, score.as_deref())
                .context("MIDI emission failed")?;
            println!("MIDI written to {}", path.display());
        }

        Commands::Render { score, no_fallback } => {
            if no_fallback {
                config.synth.allow_fallback = false;
            }
            let outputs = pipeline::run_render(&config, score.as_deref())
                .context("Rendering failed")?;
            println!(
                "Rendered {} and {}",
                outputs.audio_path.display(),
                outputs.video_path.display()
            );
        }

        Commands::Run {
            raw_dir,
            skip_failed,
        } => {
            if let Some(dir) = raw_dir {
                config.raw_dir = dir;
            }
            config.skip_failed_scenes |= skip_failed;
            let outputs = pipeline::run_all(&config).context("Pipeline failed")?;
            println!(
                "Done: {} and {}",
                outputs.audio_path.display(),
                outputs.video_path.display()
            );
        }
    }

    Ok(())
}
