use std::path::PathBuf;

use apify_client::InstagramPost;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Placeholder for a field the model could not determine.
pub const UNKNOWN: &str = "Unknown";

// --- Posts ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostKind {
    Image,
    Video,
}

/// One social-media post, as fetched. Never mutated after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub url: String,
    pub owner: String,
    pub caption: String,
    /// ISO-8601 as returned by the content API.
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: PostKind,
    /// Still image URL when there is one, otherwise the video URL.
    pub media_url: Option<String>,
    /// Stream to pull the representative frame from, for video posts.
    pub video_url: Option<String>,
}

impl Post {
    /// Normalize a typed dataset item. Items without an id cannot be
    /// deduplicated and are rejected.
    pub fn from_instagram(raw: InstagramPost) -> Option<Self> {
        let id = raw.id.clone().filter(|id| !id.trim().is_empty())?;
        let kind = if raw.is_video() {
            PostKind::Video
        } else {
            PostKind::Image
        };
        let media_url = raw
            .image()
            .map(str::to_string)
            .or_else(|| raw.video_url.clone());

        Some(Self {
            id,
            url: raw.url.unwrap_or_default(),
            owner: raw.owner_username.unwrap_or_default(),
            caption: raw.caption.unwrap_or_default(),
            timestamp: raw.timestamp.unwrap_or_default(),
            kind,
            media_url,
            video_url: raw.video_url,
        })
    }

    /// Normalize a raw dataset item.
    pub fn from_raw(item: Value) -> Option<Self> {
        match serde_json::from_value::<InstagramPost>(item) {
            Ok(raw) => Self::from_instagram(raw),
            Err(e) => {
                tracing::warn!(error = %e, "Dataset item is not a post");
                None
            }
        }
    }

    /// URL of the still image to download, if the post is not a video.
    pub fn image_url(&self) -> Option<&str> {
        match self.kind {
            PostKind::Image => self.media_url.as_deref(),
            PostKind::Video => None,
        }
    }
}

// --- Events ---

/// A performer credited on a poster. Models answer with `nom`/`arobase`.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct Artist {
    #[serde(rename = "nom")]
    pub name: String,
    #[serde(rename = "arobase")]
    pub handle: String,
}

/// Accepts `{"nom", "arobase"}` (or `name`/`handle`) objects and, since
/// models sometimes flatten the list, bare names.
impl<'de> Deserialize<'de> for Artist {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Object(mut fields) => {
                let mut text = |keys: [&str; 2]| {
                    keys.iter()
                        .find_map(|k| fields.remove(*k))
                        .and_then(scalar_text)
                        .unwrap_or_default()
                };
                Artist {
                    name: text(["nom", "name"]),
                    handle: text(["arobase", "handle"]),
                }
            }
            other => Artist {
                name: scalar_text(other).unwrap_or_default(),
                handle: String::new(),
            },
        })
    }
}

/// One event extracted from a post.
///
/// Undetermined `day`/`time`/`event_type`/`price` hold [`UNKNOWN`]; the field is
/// never omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EventRecord {
    /// `YYYY-MM-DD` or "Unknown".
    #[serde(default = "unknown", deserialize_with = "text_or_unknown")]
    pub day: String,
    /// `HH:MM`, `HH:MM-HH:MM` or "Unknown".
    #[serde(default = "unknown", deserialize_with = "text_or_unknown")]
    pub time: String,
    #[serde(default, deserialize_with = "list_or_empty")]
    pub artists: Vec<Artist>,
    #[serde(default = "unknown", deserialize_with = "text_or_unknown")]
    pub event_type: String,
    /// Model's own estimate, in [0, 1].
    #[serde(default, deserialize_with = "number_or_zero")]
    pub confidence: f64,
    #[serde(rename = "prix", alias = "price", default = "unknown", deserialize_with = "text_or_unknown")]
    pub price: String,
    #[serde(default, deserialize_with = "text_or_empty")]
    pub description: String,
    /// Music style / ambience labels.
    #[serde(default, deserialize_with = "list_or_empty")]
    pub tags: Vec<String>,
}

impl EventRecord {
    /// Enforce the confidence bound, logging when the model stepped outside it.
    pub fn normalized(mut self) -> Self {
        if !(0.0..=1.0).contains(&self.confidence) {
            let clamped = if self.confidence.is_nan() {
                0.0
            } else {
                self.confidence.clamp(0.0, 1.0)
            };
            tracing::warn!(
                confidence = self.confidence,
                clamped,
                "Model confidence outside [0, 1]"
            );
            self.confidence = clamped;
        }
        self
    }
}

/// Model answer: events plus any inconsistencies the model noticed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EventExtraction {
    #[serde(default, deserialize_with = "list_or_empty")]
    pub events: Vec<EventRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "messages_or_empty")]
    pub errors: Vec<String>,
}

impl EventExtraction {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn normalized(self) -> Self {
        Self {
            events: self.events.into_iter().map(EventRecord::normalized).collect(),
            errors: self.errors,
        }
    }
}

/// What the poster extractor produced for one image.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum VisualOutcome {
    Parsed(EventExtraction),
    /// The model answered with something that is not the expected JSON.
    Invalid { error: String, raw: String },
}

impl VisualOutcome {
    pub fn invalid(raw: impl Into<String>) -> Self {
        VisualOutcome::Invalid {
            error: "Invalid JSON response".to_string(),
            raw: raw.into(),
        }
    }

    /// Events carried by the outcome; an invalid answer carries none.
    pub fn events(&self) -> &[EventRecord] {
        match self {
            VisualOutcome::Parsed(extraction) => &extraction.events,
            VisualOutcome::Invalid { .. } => &[],
        }
    }
}

// --- Aggregation ---

/// Where the stored events came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Poster,
    Caption,
}

/// Everything the pipeline learned about a single post.
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedPost {
    pub post: Post,
    pub image_local_path: Option<PathBuf>,
    pub visual: Option<VisualOutcome>,
    pub source: EventSource,
    pub events: Vec<EventRecord>,
}

// --- Storage ---

/// One CSV line of `events.csv` / `events_enriched.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRow {
    pub post_id: String,
    pub post_url: String,
    pub owner: String,
    pub caption: String,
    pub timestamp: String,
    pub media_url: String,
    pub image_local_path: String,
    /// JSON-encoded event list.
    pub ocr_events: String,
}

impl StoredRow {
    pub const HEADERS: [&'static str; 8] = [
        "post_id",
        "post_url",
        "owner",
        "caption",
        "timestamp",
        "media_url",
        "image_local_path",
        "ocr_events",
    ];

    pub fn from_aggregated(aggregated: &AggregatedPost) -> crate::error::Result<Self> {
        let post = &aggregated.post;
        Ok(Self {
            post_id: post.id.clone(),
            post_url: post.url.clone(),
            owner: post.owner.clone(),
            caption: post.caption.clone(),
            timestamp: post.timestamp.clone(),
            media_url: post.media_url.clone().unwrap_or_default(),
            image_local_path: aggregated
                .image_local_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            ocr_events: serde_json::to_string(&aggregated.events)?,
        })
    }

    /// Entries in the stored event list. A blank cell, text that is not JSON
    /// and JSON that is not a list all count as zero. Entries are not
    /// validated against [`EventRecord`]; whatever is stored is kept.
    pub fn event_count(&self) -> usize {
        match serde_json::from_str::<Value>(&self.ocr_events) {
            Ok(Value::Array(items)) => items.len(),
            _ => 0,
        }
    }
}

// --- Lenient model-output decoding ---

fn unknown() -> String {
    UNKNOWN.to_string()
}

fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn text_or_unknown<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(scalar_text(Value::deserialize(d)?).unwrap_or_else(unknown))
}

fn text_or_empty<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(scalar_text(Value::deserialize(d)?).unwrap_or_default())
}

fn number_or_zero<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

/// Elements that do not decode are dropped one by one; a lone value stands
/// for a one-element list.
fn list_or_empty<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Value::deserialize(d)? {
        Value::Null => Vec::new(),
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        other => serde_json::from_value(other).ok().into_iter().collect(),
    })
}

fn messages_or_empty<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Array(items) => items.into_iter().filter_map(scalar_text).collect(),
        other => scalar_text(other).into_iter().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn model_field_names_decode_into_record() {
        let record: EventRecord = serde_json::from_value(json!({
            "day": "2025-08-23",
            "time": "22:00-05:00",
            "artists": [{"nom": "DJ Vino", "arobase": "@djvino"}],
            "event_type": "DJ set",
            "confidence": 0.8,
            "prix": "10€",
            "description": "Disco night",
            "tags": ["disco"]
        }))
        .unwrap();

        assert_eq!(record.price, "10€");
        assert_eq!(record.artists[0].name, "DJ Vino");
        assert_eq!(record.artists[0].handle, "@djvino");
    }

    #[test]
    fn missing_and_null_fields_become_unknown() {
        let record: EventRecord =
            serde_json::from_value(json!({"day": null, "tags": null, "prix": ""})).unwrap();
        assert_eq!(record.day, UNKNOWN);
        assert_eq!(record.time, UNKNOWN);
        assert_eq!(record.price, UNKNOWN);
        assert_eq!(record.event_type, UNKNOWN);
        assert!(record.tags.is_empty());
        assert_eq!(record.confidence, 0.0);
    }

    #[test]
    fn numeric_price_and_string_confidence_are_tolerated() {
        let record: EventRecord =
            serde_json::from_value(json!({"prix": 15, "confidence": "0.7"})).unwrap();
        assert_eq!(record.price, "15");
        assert!((record.confidence - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn serialization_keeps_model_names() {
        let record: EventRecord = serde_json::from_value(json!({"price": "free"})).unwrap();
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["prix"], "free");
        assert!(value.get("price").is_none());
        assert_eq!(value["day"], UNKNOWN);
    }

    #[test]
    fn confidence_is_clamped_into_unit_interval() {
        let high: EventRecord = serde_json::from_value(json!({"confidence": 3.5})).unwrap();
        assert_eq!(high.normalized().confidence, 1.0);

        let low: EventRecord = serde_json::from_value(json!({"confidence": -0.2})).unwrap();
        assert_eq!(low.normalized().confidence, 0.0);

        let ok: EventRecord = serde_json::from_value(json!({"confidence": 0.42})).unwrap();
        assert_eq!(ok.normalized().confidence, 0.42);
    }

    #[test]
    fn extraction_errors_accept_objects() {
        let extraction: EventExtraction = serde_json::from_value(json!({
            "events": [],
            "errors": ["date illisible", {"field": "time"}]
        }))
        .unwrap();
        assert_eq!(extraction.errors.len(), 2);
    }

    #[test]
    fn empty_extraction_serializes_as_bare_event_list() {
        let value = serde_json::to_value(EventExtraction::empty()).unwrap();
        assert_eq!(value, json!({"events": []}));
    }

    #[test]
    fn invalid_outcome_carries_raw_text_and_no_events() {
        let outcome = VisualOutcome::invalid("Sorry, I can't read this poster.");
        assert!(outcome.events().is_empty());
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["error"], "Invalid JSON response");
        assert_eq!(value["raw"], "Sorry, I can't read this poster.");
    }

    #[test]
    fn video_post_prefers_display_image_for_media_url() {
        let post = Post::from_raw(json!({
            "id": "3650",
            "url": "https://www.instagram.com/p/abc/",
            "ownerUsername": "vinodiscobar",
            "timestamp": "2025-08-19T18:30:00.000Z",
            "type": "Video",
            "displayUrl": "https://cdn/thumb.jpg",
            "videoUrl": "https://cdn/clip.mp4"
        }))
        .unwrap();

        assert_eq!(post.kind, PostKind::Video);
        assert_eq!(post.media_url.as_deref(), Some("https://cdn/thumb.jpg"));
        assert_eq!(post.video_url.as_deref(), Some("https://cdn/clip.mp4"));
        assert_eq!(post.image_url(), None);
        assert_eq!(post.caption, "");
    }

    #[test]
    fn post_without_id_is_rejected() {
        assert!(Post::from_raw(json!({"url": "https://x", "type": "Image"})).is_none());
    }

    #[test]
    fn string_artists_become_names() {
        let record: EventRecord = serde_json::from_value(json!({
            "time": "22:00",
            "artists": ["DJ X", {"name": "MC Y", "handle": "@mcy"}, null]
        }))
        .unwrap();

        assert_eq!(record.time, "22:00");
        assert_eq!(record.artists.len(), 3);
        assert_eq!(record.artists[0], Artist { name: "DJ X".into(), handle: String::new() });
        assert_eq!(record.artists[1].handle, "@mcy");
        assert_eq!(record.artists[2].name, "");

        let lone: EventRecord = serde_json::from_value(json!({"artists": "DJ X"})).unwrap();
        assert_eq!(lone.artists[0].name, "DJ X");
    }

    #[test]
    fn undecodable_events_are_dropped_individually() {
        let extraction: EventExtraction = serde_json::from_value(json!({
            "events": ["Friday party", {"day": "2025-08-22", "tags": "house"}]
        }))
        .unwrap();

        assert_eq!(extraction.events.len(), 1);
        assert_eq!(extraction.events[0].day, "2025-08-22");
        assert_eq!(extraction.events[0].tags, vec!["house".to_string()]);
    }

    fn row_with_events(ocr_events: &str) -> StoredRow {
        StoredRow {
            post_id: "1".into(),
            post_url: String::new(),
            owner: String::new(),
            caption: String::new(),
            timestamp: String::new(),
            media_url: String::new(),
            image_local_path: String::new(),
            ocr_events: ocr_events.into(),
        }
    }

    #[test]
    fn stored_event_count_only_counts_json_lists() {
        assert_eq!(row_with_events("  ").event_count(), 0);
        assert_eq!(row_with_events("[]").event_count(), 0);
        assert_eq!(row_with_events("{not json").event_count(), 0);
        assert_eq!(row_with_events(r#"{"day":"2025-08-22"}"#).event_count(), 0);
        assert_eq!(row_with_events(r#"[{"day":"2025-08-22"},{}]"#).event_count(), 2);
        // Stored by an older writer with string artists; still an event.
        assert_eq!(row_with_events(r#"[{"artists":["DJ X"]}]"#).event_count(), 1);
    }
}
