use std::marker::PhantomData;

use anyhow::Result;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::traits::{ImageInput, OutputBuilder, PromptBuilder};

use super::schema::StructuredOutput;
use super::types::*;
use super::OpenAi;

pub struct OpenAiPromptBuilder {
    agent: OpenAi,
    input: String,
    preamble: Option<String>,
    temperature: Option<f32>,
    images: Vec<ImageInput>,
}

impl OpenAiPromptBuilder {
    pub(crate) fn new(agent: OpenAi, input: String) -> Self {
        Self {
            agent,
            input,
            preamble: None,
            temperature: None,
            images: Vec::new(),
        }
    }

    /// Create a structured output builder for extracting typed data.
    pub fn output<T: DeserializeOwned + JsonSchema + Send + 'static>(
        self,
    ) -> OpenAiOutputBuilder<T> {
        OpenAiOutputBuilder {
            builder: self,
            _phantom: PhantomData,
        }
    }

    fn wire_messages(&self) -> Vec<WireMessage> {
        let mut messages = Vec::new();

        if let Some(ref preamble) = self.preamble {
            messages.push(WireMessage::system(preamble));
        }

        if !self.images.is_empty() {
            let urls = self.images.iter().map(ImageInput::data_url).collect();
            messages.push(WireMessage::user_with_images(&self.input, urls));
        } else if !self.input.is_empty() {
            messages.push(WireMessage::user(&self.input));
        }

        messages
    }

    fn request(&self) -> ChatRequest {
        let mut request = ChatRequest::new(&self.agent.model)
            .messages(self.wire_messages())
            .token_limit(4096);
        if let Some(temp) = self.temperature {
            request = request.temperature(temp);
        }
        request
    }
}

#[async_trait]
impl PromptBuilder for OpenAiPromptBuilder {
    fn preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = Some(preamble.into());
        self
    }

    fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    fn image(mut self, image: ImageInput) -> Self {
        self.images.push(image);
        self
    }

    async fn send(self) -> Result<String> {
        let request = self.request();
        self.agent.client()?.chat(&request).await
    }
}

// =============================================================================
// Structured Output Builder
// =============================================================================

pub struct OpenAiOutputBuilder<T> {
    builder: OpenAiPromptBuilder,
    _phantom: PhantomData<T>,
}

impl<T: DeserializeOwned + JsonSchema + Send + 'static> OpenAiOutputBuilder<T> {
    fn request(&self) -> ChatRequest {
        // Structured extraction wants determinism unless told otherwise.
        ChatRequest::new(&self.builder.agent.model)
            .messages(self.builder.wire_messages())
            .token_limit(4096)
            .temperature(self.builder.temperature.unwrap_or(0.0))
            .response_format(ResponseFormat::strict_schema(T::openai_schema()))
    }
}

#[async_trait]
impl<T: DeserializeOwned + JsonSchema + Send + 'static> OutputBuilder<T>
    for OpenAiOutputBuilder<T>
{
    async fn send_raw(self) -> Result<String> {
        debug!(
            type_name = T::type_name(),
            images = self.builder.images.len(),
            "OpenAI structured output extraction"
        );

        let request = self.request();
        self.builder.agent.client()?.chat(&request).await
    }
}
