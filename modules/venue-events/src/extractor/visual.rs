use std::time::Duration;

use ai_client::util::{strip_code_blocks, truncate_to_char_boundary};
use ai_client::{ImageInput, OpenAi};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{ImageRef, VisionModel, VisualExtractor};
use crate::types::{EventExtraction, VisualOutcome};

const IMAGE_FETCH_TIMEOUT: Duration = Duration::from_secs(20);

const POSTER_PREAMBLE: &str = "You are an OCR assistant specialised in event posters for bars and clubs.";

fn poster_prompt(caption: &str) -> String {
    format!(
        r#"Read the attached image and return structured event data.
Return ONLY valid JSON, without markdown fences.

Caption of the post: "{caption}"

Expected format:
{{
  "events": [
    {{
      "day": "...",
      "time": "...",
      "artists": [{{"nom": "...", "arobase": "..."}}],
      "event_type": "...",
      "confidence": 0.0,
      "prix": "...",
      "description": "...",
      "tags": ["..."]
    }}
  ],
  "errors": []
}}

Rules:
- Fix typical OCR mistakes (misread letters, digits, accents).
- Normalise times to "HH:MM" or "HH:MM-HH:MM" (e.g. "19:00", "22:00-06:00").
- Infer event_type from context (jazz, concert, DJ set...).
- Give a confidence estimate between 0 and 1.
- Use "Unknown" for anything you cannot determine; never leave a field out.
- List every inconsistency you notice in "errors"."#
    )
}

/// Reads events off poster images with a multimodal model.
pub struct PosterExtractor<M> {
    model: M,
    http: reqwest::Client,
}

impl<M: VisionModel> PosterExtractor<M> {
    pub fn new(model: M) -> crate::error::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(IMAGE_FETCH_TIMEOUT)
            .build()?;
        Ok(Self { model, http })
    }

    /// Image bytes, held in memory for the duration of the call.
    async fn load(&self, image: &ImageRef) -> Result<Vec<u8>> {
        match image {
            ImageRef::Path(path) => tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read image {}", path.display())),
            ImageRef::Url(url) => {
                let resp = self.http.get(url).send().await?;
                if !resp.status().is_success() {
                    return Err(anyhow!("Image fetch failed ({}): {}", resp.status(), url));
                }
                Ok(resp.bytes().await?.to_vec())
            }
        }
    }
}

impl PosterExtractor<OpenAi> {
    pub fn openai(api_key: &str, model: &str) -> crate::error::Result<Self> {
        Self::new(OpenAi::new(api_key, model))
    }
}

/// Interpret the model's answer. Anything that is not the expected JSON
/// document is kept verbatim in an `Invalid` outcome.
pub fn parse_poster_response(raw: &str) -> VisualOutcome {
    match serde_json::from_str::<EventExtraction>(strip_code_blocks(raw)) {
        Ok(extraction) => VisualOutcome::Parsed(extraction.normalized()),
        Err(e) => {
            warn!(
                error = %e,
                raw = truncate_to_char_boundary(raw, 200),
                "Poster response is not valid JSON"
            );
            VisualOutcome::invalid(raw)
        }
    }
}

#[async_trait]
impl<M: VisionModel> VisualExtractor for PosterExtractor<M> {
    async fn extract(&self, image: &ImageRef, caption: &str) -> Result<VisualOutcome> {
        let bytes = self.load(image).await?;
        debug!(?image, bytes = bytes.len(), "Sending poster to vision model");

        let raw = self
            .model
            .read_image(POSTER_PREAMBLE, &poster_prompt(caption), ImageInput::jpeg(bytes))
            .await?;

        let outcome = parse_poster_response(&raw);
        info!(?image, events = outcome.events().len(), "Poster extraction complete");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UNKNOWN;
    use std::sync::Mutex;

    struct Seen {
        preamble: String,
        prompt: String,
        bytes: usize,
    }

    struct CannedVision {
        answer: String,
        seen: Mutex<Vec<Seen>>,
    }

    #[async_trait]
    impl VisionModel for CannedVision {
        async fn read_image(&self, preamble: &str, prompt: &str, image: ImageInput) -> Result<String> {
            self.seen.lock().unwrap().push(Seen {
                preamble: preamble.to_string(),
                prompt: prompt.to_string(),
                bytes: image.bytes.len(),
            });
            Ok(self.answer.clone())
        }
    }

    fn canned(answer: &str) -> PosterExtractor<CannedVision> {
        PosterExtractor::new(CannedVision {
            answer: answer.to_string(),
            seen: Mutex::new(Vec::new()),
        })
        .unwrap()
    }

    #[test]
    fn prompt_embeds_caption() {
        let prompt = poster_prompt("Soirée disco vendredi");
        assert!(prompt.contains("Caption of the post: \"Soirée disco vendredi\""));
        assert!(prompt.contains("\"prix\""));
    }

    #[test]
    fn fenced_json_is_accepted() {
        let outcome = parse_poster_response("```json\n{\"events\":[{\"day\":\"2025-08-22\"}],\"errors\":[]}\n```");
        assert_eq!(outcome.events().len(), 1);
        assert_eq!(outcome.events()[0].time, UNKNOWN);
    }

    #[test]
    fn prose_answer_becomes_invalid_outcome() {
        let outcome = parse_poster_response("I could not find any event on this poster.");
        match outcome {
            VisualOutcome::Invalid { raw, .. } => {
                assert_eq!(raw, "I could not find any event on this poster.")
            }
            other => panic!("expected invalid outcome, got {other:?}"),
        }
    }

    #[test]
    fn parsed_confidence_stays_in_unit_interval() {
        let outcome = parse_poster_response(
            r#"{"events":[{"confidence":1.7},{"confidence":-1},{"confidence":0.5}],"errors":[]}"#,
        );
        assert!(outcome
            .events()
            .iter()
            .all(|e| (0.0..=1.0).contains(&e.confidence)));
    }

    #[tokio::test]
    async fn local_image_is_sent_from_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("poster.jpg");
        std::fs::write(&path, [0xff, 0xd8, 0xff, 0xe0]).unwrap();

        let extractor = canned(r#"{"events":[{"day":"2025-08-23","time":"22:00"}],"errors":[]}"#);
        let outcome = extractor
            .extract(&ImageRef::Path(path), "DJ night")
            .await
            .unwrap();

        assert_eq!(outcome.events()[0].time, "22:00");
        let seen = extractor.model.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].bytes, 4);
        assert!(seen[0].prompt.contains("DJ night"));
        assert!(seen[0].preamble.starts_with("You are an OCR assistant"));
        assert!(!seen[0].prompt.contains("OCR assistant"));
    }

    #[tokio::test]
    async fn missing_local_image_is_an_error() {
        let extractor = canned("{}");
        let result = extractor
            .extract(&ImageRef::Path("/nonexistent/poster.jpg".into()), "")
            .await;
        assert!(result.is_err());
        assert!(extractor.model.seen.lock().unwrap().is_empty());
    }
}
