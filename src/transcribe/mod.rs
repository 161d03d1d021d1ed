use async_trait::async_trait;
use std::path::Path;

pub mod command;

pub use command::CommandTranscriber;

use crate::ScribeError;

/// Speech-to-text backend
///
/// Implementations usually hold a loaded model, so `transcribe` takes
/// `&mut self`: the pipeline gives the transcriber to exactly one worker,
/// which makes a second concurrent call impossible to write.
#[async_trait]
pub trait Transcriber: Send {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Transcribe one audio file into plain text
    async fn transcribe(&mut self, audio: &Path) -> Result<String, ScribeError>;
}

#[async_trait]
impl<T: Transcriber + ?Sized> Transcriber for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn transcribe(&mut self, audio: &Path) -> Result<String, ScribeError> {
        (**self).transcribe(audio).await
    }
}
