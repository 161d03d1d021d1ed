use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Stage concurrency and output layout
    pub pipeline: PipelineConfig,

    /// External download and conversion tools
    pub tools: ToolsConfig,

    /// Speech-to-text command
    pub transcriber: TranscriberConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root folder for playlist folders (current directory if unset)
    pub output_root: Option<PathBuf>,

    /// Maximum simultaneous downloads
    pub download_concurrency: usize,

    /// Maximum simultaneous conversions
    pub conversion_concurrency: usize,

    /// Maximum simultaneous metadata lookups
    pub metadata_concurrency: usize,

    /// How converted audio reaches the transcription stage
    pub handoff: HandoffMode,
}

/// Conversion to transcription handoff strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandoffMode {
    /// Use the list of files the conversion stage reported
    Memory,
    /// Scan the output root for audio files once conversion is done
    Rescan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// yt-dlp executable
    pub yt_dlp: String,

    /// ffmpeg executable
    pub ffmpeg: String,

    /// Target audio extension produced by conversion
    pub audio_format: String,

    /// Audio bitrate passed to ffmpeg
    pub audio_bitrate: String,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Number of audio channels
    pub channels: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriberConfig {
    /// Transcriber executable
    pub program: String,

    /// Arguments; `{input}`, `{output_dir}` and `{model}` are substituted
    pub args: Vec<String>,

    /// Model identifier handed to the transcriber
    pub model: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_root: None,
            download_concurrency: 10,
            conversion_concurrency: 8,
            metadata_concurrency: 50,
            handoff: HandoffMode::Memory,
        }
    }
}

impl PipelineConfig {
    /// Every stage needs at least one worker
    pub fn validate(&self) -> Result<()> {
        let caps = [
            ("download_concurrency", self.download_concurrency),
            ("conversion_concurrency", self.conversion_concurrency),
            ("metadata_concurrency", self.metadata_concurrency),
        ];
        for (name, value) in caps {
            if value == 0 {
                anyhow::bail!("{} must be at least 1", name);
            }
        }
        Ok(())
    }

    /// Output root, falling back to the current directory
    pub fn resolved_output_root(&self) -> Result<PathBuf> {
        match &self.output_root {
            Some(root) => Ok(root.clone()),
            None => std::env::current_dir().context("Could not determine current directory"),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            yt_dlp: "yt-dlp".to_string(),
            ffmpeg: "ffmpeg".to_string(),
            audio_format: "mp3".to_string(),
            audio_bitrate: "192k".to_string(),
            sample_rate: 44100,
            channels: 2,
        }
    }
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        Self {
            program: "mlx_whisper".to_string(),
            args: vec![
                "{input}".to_string(),
                "--model".to_string(),
                "{model}".to_string(),
                "--output-format".to_string(),
                "txt".to_string(),
                "--output-dir".to_string(),
                "{output_dir}".to_string(),
            ],
            model: "mlx-community/whisper-large-v3-turbo".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file or create default
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = fs_err::read_to_string(&config_path)
                .context("Failed to read config file")?;

            let config = Self::from_yaml(&content)?;
            Ok(config)
        } else {
            let config = Self::default();
            if let Err(e) = config.save().await {
                tracing::warn!("Could not write default config to {}: {:#}", config_path.display(), e);
            }
            Ok(config)
        }
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)
            .context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(&config_path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("playlist-scribe").join("config.yaml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;

        let format = self.tools.audio_format.trim_start_matches('.');
        if format.is_empty() || format.eq_ignore_ascii_case("txt") {
            anyhow::bail!("audio_format must be an audio extension, got {:?}", self.tools.audio_format);
        }

        if self.transcriber.program.trim().is_empty() {
            anyhow::bail!("transcriber program must be configured");
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        match &self.pipeline.output_root {
            Some(root) => println!("  Output Root: {}", root.display()),
            None => println!("  Output Root: (current directory)"),
        }
        println!("  Download Concurrency: {}", self.pipeline.download_concurrency);
        println!("  Conversion Concurrency: {}", self.pipeline.conversion_concurrency);
        println!("  Metadata Concurrency: {}", self.pipeline.metadata_concurrency);
        println!("  Handoff: {:?}", self.pipeline.handoff);
        println!("  yt-dlp: {}", self.tools.yt_dlp);
        println!("  ffmpeg: {}", self.tools.ffmpeg);
        println!("  Audio Format: {} ({} Hz, {} ch, {})",
            self.tools.audio_format, self.tools.sample_rate, self.tools.channels, self.tools.audio_bitrate);
        println!("  Transcriber: {} (model {})", self.transcriber.program, self.transcriber.model);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline.metadata_concurrency, 50);
        assert_eq!(config.pipeline.handoff, HandoffMode::Memory);
    }

    #[test]
    fn partial_yaml_falls_back_to_defaults() {
        let config = Config::from_yaml(
            "pipeline:\n  download_concurrency: 15\n  handoff: rescan\n",
        )
        .unwrap();

        assert_eq!(config.pipeline.download_concurrency, 15);
        assert_eq!(config.pipeline.conversion_concurrency, 8);
        assert_eq!(config.pipeline.handoff, HandoffMode::Rescan);
        assert_eq!(config.tools.audio_format, "mp3");
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = Config::from_yaml("pipeline:\n  conversion_concurrency: 0\n").unwrap_err();
        assert!(err.to_string().contains("conversion_concurrency"));
    }

    #[test]
    fn transcript_extension_cannot_be_audio_format() {
        let mut config = Config::default();
        config.tools.audio_format = "txt".to_string();
        assert!(config.validate().is_err());
    }
}
