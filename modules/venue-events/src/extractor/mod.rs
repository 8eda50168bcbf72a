// Event extraction from post images and captions.
//
// Two layers of traits:
// - VisualExtractor / TextExtractor are what the pipeline consumes.
// - VisionModel / TextModel are the inference calls underneath, implemented
//   for ai_client::OpenAi and stubbed in tests.

pub mod caption;
pub mod visual;

pub use caption::CaptionExtractor;
pub use visual::PosterExtractor;

use std::path::PathBuf;

use ai_client::{Agent, ImageInput, OpenAi, OutputBuilder, PromptBuilder};
use anyhow::Result;
use async_trait::async_trait;

use crate::types::{EventExtraction, VisualOutcome};

/// The image a poster extractor reads: a local file or a remote URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRef {
    Path(PathBuf),
    Url(String),
}

impl ImageRef {
    /// Classify a string: `http://` / `https://` is a URL, anything else a path.
    pub fn parse(path_or_url: &str) -> Self {
        if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
            ImageRef::Url(path_or_url.to_string())
        } else {
            ImageRef::Path(PathBuf::from(path_or_url))
        }
    }
}

#[async_trait]
pub trait VisualExtractor: Send + Sync {
    /// Read events off a poster. An unusable model answer is an
    /// `Ok(VisualOutcome::Invalid)`; `Err` means the image or the call itself
    /// failed.
    async fn extract(&self, image: &ImageRef, caption: &str) -> Result<VisualOutcome>;
}

#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Infer events from caption and publish time. Never fails: any problem
    /// yields an empty event list.
    async fn extract(&self, caption: &str, timestamp: &str) -> EventExtraction;
}

// ---------------------------------------------------------------------------
// Model seams
// ---------------------------------------------------------------------------

#[async_trait]
pub trait VisionModel: Send + Sync {
    /// One structured-output request with a system preamble and a single
    /// image; returns the raw JSON text the model produced.
    async fn read_image(&self, preamble: &str, prompt: &str, image: ImageInput) -> Result<String>;
}

#[async_trait]
pub trait TextModel: Send + Sync {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String>;
}

#[async_trait]
impl VisionModel for OpenAi {
    async fn read_image(&self, preamble: &str, prompt: &str, image: ImageInput) -> Result<String> {
        self.prompt(prompt)
            .preamble(preamble)
            .image(image)
            .output::<EventExtraction>()
            .send_raw()
            .await
    }
}

#[async_trait]
impl TextModel for OpenAi {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String> {
        OpenAi::complete(self, prompt, temperature).await
    }
}
