use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::{Config, HandoffMode};

#[derive(Parser)]
#[command(
    name = "playlist-scribe",
    about = "Playlist Scribe - Download playlists and transcribe every item into text",
    version,
    long_about = "Downloads every item of one or more media playlists, converts them to audio with ffmpeg and transcribes them one at a time with a local speech-to-text model. Per-item transcripts are merged into one document per playlist."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "pretty")]
    pub log_format: LogFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Transcribe every item of one or more playlists
    Run {
        /// Playlist URLs (local folders and direct media URLs are accepted too)
        #[arg(value_name = "PLAYLIST", required = true)]
        playlists: Vec<String>,

        #[command(flatten)]
        options: RunOptions,
    },

    /// Transcribe a single video, media URL or local file
    Single {
        /// URL or file path to transcribe
        #[arg(value_name = "URL_OR_FILE")]
        reference: String,

        #[command(flatten)]
        options: RunOptions,
    },

    /// Transcribe every audio/video file found in local folders
    Folder {
        /// Folders containing media files
        #[arg(value_name = "DIR", required = true)]
        folders: Vec<PathBuf>,

        #[command(flatten)]
        options: RunOptions,
    },

    /// Report missing external tools (yt-dlp, ffmpeg, transcriber)
    Check,

    /// Show configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },
}

/// Options shared by every command that starts a pipeline run
#[derive(Args, Debug, Clone, Default)]
pub struct RunOptions {
    /// Root folder receiving one sub-folder per playlist
    #[arg(short, long, value_name = "DIR", env = "SCRIBE_OUTPUT_ROOT")]
    pub output_root: Option<PathBuf>,

    /// Maximum simultaneous downloads
    #[arg(long, value_name = "N", env = "SCRIBE_DOWNLOAD_CONCURRENCY")]
    pub download_concurrency: Option<usize>,

    /// Maximum simultaneous audio conversions
    #[arg(long, value_name = "N", env = "SCRIBE_CONVERSION_CONCURRENCY")]
    pub conversion_concurrency: Option<usize>,

    /// Maximum simultaneous playlist metadata lookups
    #[arg(long, value_name = "N", env = "SCRIBE_METADATA_CONCURRENCY")]
    pub metadata_concurrency: Option<usize>,

    /// How converted audio is handed to the transcription stage
    #[arg(long, value_enum, env = "SCRIBE_HANDOFF")]
    pub handoff: Option<HandoffArg>,
}

impl RunOptions {
    /// Apply command-line overrides on top of the loaded configuration
    pub fn apply(&self, config: &mut Config) {
        if let Some(root) = &self.output_root {
            config.pipeline.output_root = Some(root.clone());
        }
        if let Some(n) = self.download_concurrency {
            config.pipeline.download_concurrency = n;
        }
        if let Some(n) = self.conversion_concurrency {
            config.pipeline.conversion_concurrency = n;
        }
        if let Some(n) = self.metadata_concurrency {
            config.pipeline.metadata_concurrency = n;
        }
        if let Some(handoff) = self.handoff {
            config.pipeline.handoff = handoff.into();
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum HandoffArg {
    /// Hand converted files over in memory
    Memory,
    /// Rescan the output root for audio files after conversion
    Rescan,
}

impl From<HandoffArg> for HandoffMode {
    fn from(arg: HandoffArg) -> Self {
        match arg {
            HandoffArg::Memory => HandoffMode::Memory,
            HandoffArg::Rescan => HandoffMode::Rescan,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable lines
    Pretty,
    /// One JSON object per line
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_options_override_config() {
        let mut config = Config::default();
        let options = RunOptions {
            output_root: Some(PathBuf::from("/tmp/out")),
            download_concurrency: Some(3),
            conversion_concurrency: None,
            metadata_concurrency: Some(7),
            handoff: Some(HandoffArg::Rescan),
        };

        options.apply(&mut config);

        assert_eq!(config.pipeline.output_root, Some(PathBuf::from("/tmp/out")));
        assert_eq!(config.pipeline.download_concurrency, 3);
        assert_eq!(config.pipeline.conversion_concurrency, 8);
        assert_eq!(config.pipeline.metadata_concurrency, 7);
        assert_eq!(config.pipeline.handoff, HandoffMode::Rescan);
    }

    #[test]
    fn parses_run_command_with_flags() {
        let cli = Cli::try_parse_from([
            "playlist-scribe",
            "run",
            "https://www.youtube.com/playlist?list=abc",
            "--download-concurrency",
            "4",
            "--handoff",
            "memory",
        ])
        .unwrap();

        match cli.command {
            Commands::Run { playlists, options } => {
                assert_eq!(playlists.len(), 1);
                assert_eq!(options.download_concurrency, Some(4));
                assert!(matches!(options.handoff, Some(HandoffArg::Memory)));
            }
            _ => panic!("expected run command"),
        }
    }
}
