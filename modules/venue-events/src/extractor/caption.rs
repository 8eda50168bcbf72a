use ai_client::util::{strip_code_blocks, truncate_to_char_boundary};
use ai_client::OpenAi;
use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{TextExtractor, TextModel};
use crate::types::EventExtraction;

/// Some variety, but still mostly deterministic.
const CAPTION_TEMPERATURE: f32 = 0.3;

fn caption_prompt(caption: &str, timestamp: &str) -> String {
    format!(
        r#"You are an events assistant. No event could be read from the post's poster.
Available information:
- Caption: {caption}
- Timestamp (publication date of the post): {timestamp}

Instructions:
1. If the caption uses relative expressions such as "this Saturday", "ce vendredi", "tonight", "ce soir", compute the actual date from the post timestamp.
   Example: a post published on Tuesday 19 August saying "this Saturday" refers to Saturday 23 August.
2. If no date information is clear, set "day": "Unknown" and "time": "Unknown".
3. Tags describe the music style / ambience (e.g. "house", "techno", "hip-hop", "live jazz", "EDM", "disco", "afrobeat", "pop").
4. If nothing points to a specific style, use a general tag such as "club", "nightlife", "DJ set".

Do not explain anything. Answer with strict JSON only, in this format:
{{
  "events": [
    {{
      "day": "YYYY-MM-DD",
      "time": "HH:MM",
      "artists": [{{"nom": "...", "arobase": "..."}}],
      "event_type": "...",
      "confidence": 0.0,
      "prix": "...",
      "description": "...",
      "tags": ["..."]
    }}
  ]
}}"#
    )
}

/// Fallback extractor working from the caption and publish time only.
pub struct CaptionExtractor<M> {
    model: M,
}

impl<M: TextModel> CaptionExtractor<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }
}

impl CaptionExtractor<OpenAi> {
    pub fn openai(api_key: &str, model: &str) -> Self {
        Self::new(OpenAi::new(api_key, model))
    }
}

#[async_trait]
impl<M: TextModel> TextExtractor for CaptionExtractor<M> {
    async fn extract(&self, caption: &str, timestamp: &str) -> EventExtraction {
        if caption.trim().is_empty() && timestamp.trim().is_empty() {
            debug!("Caption and timestamp both empty, skipping model call");
            return EventExtraction::empty();
        }

        let content = match self
            .model
            .complete(&caption_prompt(caption, timestamp), CAPTION_TEMPERATURE)
            .await
        {
            Ok(content) => content,
            Err(e) => {
                warn!(error = %e, "Caption extraction call failed");
                return EventExtraction::empty();
            }
        };

        let content = strip_code_blocks(&content);
        if content.is_empty() {
            warn!("Caption extraction returned an empty answer");
            return EventExtraction::empty();
        }

        match serde_json::from_str::<EventExtraction>(content) {
            Ok(extraction) => {
                let extraction = extraction.normalized();
                info!(events = extraction.events.len(), "Caption extraction complete");
                extraction
            }
            Err(e) => {
                warn!(
                    error = %e,
                    raw = truncate_to_char_boundary(content, 200),
                    "Caption extraction answer is not valid JSON"
                );
                EventExtraction::empty()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingModel {
        answer: Option<String>,
        calls: AtomicUsize,
    }

    impl CountingModel {
        fn answering(answer: &str) -> Self {
            Self {
                answer: Some(answer.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                answer: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TextModel for CountingModel {
        async fn complete(&self, _prompt: &str, _temperature: f32) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone().ok_or_else(|| anyhow!("503 Service Unavailable"))
        }
    }

    #[tokio::test]
    async fn blank_input_short_circuits_without_a_call() {
        let extractor = CaptionExtractor::new(CountingModel::answering("{}"));
        let result = extractor.extract("", "").await;

        assert_eq!(serde_json::to_value(&result).unwrap(), serde_json::json!({"events": []}));
        assert_eq!(extractor.model.calls.load(Ordering::SeqCst), 0);

        extractor.extract("   ", "\n").await;
        assert_eq!(extractor.model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn timestamp_alone_still_calls_the_model() {
        let extractor = CaptionExtractor::new(CountingModel::answering(r#"{"events":[]}"#));
        extractor.extract("", "2025-08-19T18:30:00Z").await;
        assert_eq!(extractor.model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn call_failure_yields_empty_list() {
        let extractor = CaptionExtractor::new(CountingModel::failing());
        let result = extractor.extract("DJ night Friday", "2025-08-19T18:30:00Z").await;
        assert!(result.events.is_empty());
    }

    #[tokio::test]
    async fn unparsable_answer_yields_empty_list() {
        let extractor = CaptionExtractor::new(CountingModel::answering("Here are the events: none"));
        let result = extractor.extract("DJ night Friday", "2025-08-19T18:30:00Z").await;
        assert!(result.events.is_empty());
    }

    #[tokio::test]
    async fn fenced_answer_is_parsed() {
        let extractor = CaptionExtractor::new(CountingModel::answering(
            "```json\n{\"events\":[{\"day\":\"2025-08-22\",\"time\":\"22:00\",\"tags\":[\"house\"]}]}\n```",
        ));
        let result = extractor.extract("DJ night Friday 22h, house music", "2025-08-19T18:30:00Z").await;
        assert_eq!(result.events.len(), 1);
        assert_eq!(result.events[0].time, "22:00");
        assert_eq!(result.events[0].tags, vec!["house".to_string()]);
    }

    #[tokio::test]
    async fn string_artists_do_not_discard_the_answer() {
        let extractor = CaptionExtractor::new(CountingModel::answering(
            r#"{"events":[{"day":"2025-08-22","time":"22:00","artists":["DJ X"],"tags":["house"]}]}"#,
        ));
        let result = extractor.extract("DJ X ce vendredi 22h", "2025-08-19T18:30:00Z").await;

        assert_eq!(result.events.len(), 1);
        assert_eq!(result.events[0].time, "22:00");
        assert_eq!(result.events[0].artists[0].name, "DJ X");
    }

    #[test]
    fn prompt_carries_caption_and_timestamp() {
        let prompt = caption_prompt("ce vendredi: house", "2025-08-19T18:30:00Z");
        assert!(prompt.contains("Caption: ce vendredi: house"));
        assert!(prompt.contains("2025-08-19T18:30:00Z"));
        assert!(prompt.contains("\"nightlife\""));
    }
}
