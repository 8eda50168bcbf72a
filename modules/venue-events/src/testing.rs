// Test doubles for the pipeline's four trait boundaries:
// - MockFetcher (SourceFetcher): canned dataset items
// - MockMaterializer (MediaMaterializer): post id → local path
// - MockVisualExtractor (VisualExtractor): one canned outcome, call counter
// - MockTextExtractor (TextExtractor): canned events, call counter
//
// Plus builders for posts, events and stored rows.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use apify_client::ApifyError;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{PipelineError, Result as PipelineResult};
use crate::extractor::{ImageRef, TextExtractor, VisualExtractor};
use crate::fetcher::{FetchRequest, SourceFetcher};
use crate::media::MediaMaterializer;
use crate::types::{
    EventExtraction, EventRecord, Post, PostKind, StoredRow, VisualOutcome, UNKNOWN,
};

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn image_post(id: &str, owner: &str, caption: &str) -> Post {
    Post {
        id: id.to_string(),
        url: format!("https://www.instagram.com/p/{id}/"),
        owner: owner.to_string(),
        caption: caption.to_string(),
        timestamp: "2025-08-19T18:30:05.000Z".to_string(),
        kind: PostKind::Image,
        media_url: Some(format!("https://cdn.example/{id}.jpg")),
        video_url: None,
    }
}

/// Dataset item in the content API's field names.
pub fn raw_item(post: &Post) -> Value {
    json!({
        "id": post.id,
        "url": post.url,
        "ownerUsername": post.owner,
        "caption": post.caption,
        "timestamp": post.timestamp,
        "type": match post.kind {
            PostKind::Image => "Image",
            PostKind::Video => "Video",
        },
        "displayUrl": post.image_url(),
        "videoUrl": post.video_url,
    })
}

pub fn event(day: &str, time: &str) -> EventRecord {
    EventRecord {
        day: day.to_string(),
        time: time.to_string(),
        artists: Vec::new(),
        event_type: "DJ set".to_string(),
        confidence: 0.8,
        price: UNKNOWN.to_string(),
        description: String::new(),
        tags: vec!["house".to_string()],
    }
}

pub fn stored_row(post_id: &str, ocr_events: &str) -> StoredRow {
    StoredRow {
        post_id: post_id.to_string(),
        post_url: format!("https://www.instagram.com/p/{post_id}/"),
        owner: "vinodiscobar".to_string(),
        caption: "DJ night Friday 22h, house music".to_string(),
        timestamp: "2025-08-19T18:30:05.000Z".to_string(),
        media_url: format!("https://cdn.example/{post_id}.jpg"),
        image_local_path: String::new(),
        ocr_events: ocr_events.to_string(),
    }
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

pub struct MockFetcher {
    items: Vec<Value>,
    fail: bool,
    requests: Mutex<Vec<Vec<String>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            fail: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_post(mut self, post: Post) -> Self {
        self.items.push(raw_item(&post));
        self
    }

    pub fn with_item(mut self, item: Value) -> Self {
        self.items.push(item);
        self
    }

    /// Every call fails as if the content API rejected the token.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Profile URLs of each request seen so far.
    pub fn requests(&self) -> Vec<Vec<String>> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceFetcher for MockFetcher {
    async fn fetch_raw(&self, request: &FetchRequest) -> PipelineResult<Vec<Value>> {
        self.requests.lock().unwrap().push(request.direct_urls());
        if self.fail {
            return Err(PipelineError::Fetch(ApifyError::Api {
                status: 401,
                message: "invalid token".to_string(),
            }));
        }
        Ok(self.items.clone())
    }
}

// ---------------------------------------------------------------------------
// MockMaterializer
// ---------------------------------------------------------------------------

/// Returns the registered path for a post id, `None` for everything else.
pub struct MockMaterializer {
    paths: HashMap<String, PathBuf>,
}

impl MockMaterializer {
    pub fn new() -> Self {
        Self {
            paths: HashMap::new(),
        }
    }

    pub fn on_post(mut self, post_id: &str, path: impl Into<PathBuf>) -> Self {
        self.paths.insert(post_id.to_string(), path.into());
        self
    }
}

impl Default for MockMaterializer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaMaterializer for MockMaterializer {
    async fn materialize(&self, post: &Post) -> Option<PathBuf> {
        self.paths.get(&post.id).cloned()
    }
}

// ---------------------------------------------------------------------------
// MockVisualExtractor
// ---------------------------------------------------------------------------

pub struct MockVisualExtractor {
    outcome: Option<VisualOutcome>,
    calls: Mutex<Vec<ImageRef>>,
}

impl MockVisualExtractor {
    /// Answers with an empty, well-formed extraction.
    pub fn new() -> Self {
        Self {
            outcome: Some(VisualOutcome::Parsed(EventExtraction::empty())),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_events(self, events: Vec<EventRecord>) -> Self {
        self.answering(VisualOutcome::Parsed(EventExtraction {
            events,
            errors: Vec::new(),
        }))
    }

    pub fn answering(mut self, outcome: VisualOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    /// Every call fails as if the image could not be fetched.
    pub fn failing(mut self) -> Self {
        self.outcome = None;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn images(&self) -> Vec<ImageRef> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockVisualExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VisualExtractor for MockVisualExtractor {
    async fn extract(&self, image: &ImageRef, _caption: &str) -> Result<VisualOutcome> {
        self.calls.lock().unwrap().push(image.clone());
        self.outcome
            .clone()
            .ok_or_else(|| anyhow!("image fetch failed"))
    }
}

// ---------------------------------------------------------------------------
// MockTextExtractor
// ---------------------------------------------------------------------------

pub struct MockTextExtractor {
    events: Vec<EventRecord>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockTextExtractor {
    /// Answers with no events.
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_events(mut self, events: Vec<EventRecord>) -> Self {
        self.events = events;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// (caption, timestamp) of each call.
    pub fn inputs(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockTextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextExtractor for MockTextExtractor {
    async fn extract(&self, caption: &str, timestamp: &str) -> EventExtraction {
        self.calls
            .lock()
            .unwrap()
            .push((caption.to_string(), timestamp.to_string()));
        EventExtraction {
            events: self.events.clone(),
            errors: Vec::new(),
        }
    }
}
