use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tempfile::TempDir;
use tokio::process::Command;

use super::Transcriber;
use crate::config::TranscriberConfig;
use crate::ScribeError;

/// Transcriber that shells out to a whisper-style command line tool
///
/// The argument template may reference `{input}`, `{output_dir}` and
/// `{model}`. The transcript is read from `<output_dir>/<stem>.txt` when the
/// tool writes one, otherwise from its standard output.
pub struct CommandTranscriber {
    program: String,
    args: Vec<String>,
    model: String,
}

impl CommandTranscriber {
    pub fn new(config: &TranscriberConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            model: config.model.clone(),
        }
    }

    fn render_args(&self, input: &Path, output_dir: &Path) -> Vec<String> {
        let input = input.to_string_lossy();
        let output_dir = output_dir.to_string_lossy();

        self.args
            .iter()
            .map(|arg| {
                arg.replace("{input}", &input)
                    .replace("{output_dir}", &output_dir)
                    .replace("{model}", &self.model)
            })
            .collect()
    }
}

#[async_trait]
impl Transcriber for CommandTranscriber {
    fn name(&self) -> &str {
        &self.program
    }

    async fn transcribe(&mut self, audio: &Path) -> Result<String, ScribeError> {
        let output_dir = TempDir::new()
            .map_err(|e| ScribeError::transcription(audio, format!("failed to create temporary directory: {}", e)))?;

        let args = self.render_args(audio, output_dir.path());
        tracing::debug!(program = %self.program, ?args, "Running transcriber");

        let output = Command::new(&self.program)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ScribeError::transcription(audio, format!("could not run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(ScribeError::transcription(
                audio,
                format!("{} exited with {}: {}", self.program, output.status, error.trim()),
            ));
        }

        let written = audio
            .file_stem()
            .map(|stem| output_dir.path().join(format!("{}.txt", stem.to_string_lossy())));

        let text = match written.filter(|path| path.is_file()) {
            Some(path) => fs_err::read_to_string(&path)?,
            None => {
                let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if stdout.is_empty() {
                    return Err(ScribeError::transcription(audio, "transcriber produced no transcript"));
                }
                stdout
            }
        };

        Ok(text.trim().to_string())
    }
}
