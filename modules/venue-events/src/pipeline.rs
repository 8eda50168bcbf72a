// Aggregation: fetch → materialize media → poster extraction → caption
// fallback. Posts are handled one at a time, in fetch order.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::extractor::{
    CaptionExtractor, ImageRef, PosterExtractor, TextExtractor, VisualExtractor,
};
use crate::fetcher::{ApifyFetcher, FetchRequest, SourceFetcher};
use crate::media::{HttpMaterializer, MediaMaterializer};
use crate::types::{AggregatedPost, EventRecord, EventSource, Post, VisualOutcome};

/// Events for one post, with where they came from.
#[derive(Debug, Clone)]
pub struct PostEvents {
    pub visual: Option<VisualOutcome>,
    pub source: EventSource,
    pub events: Vec<EventRecord>,
}

/// Run the poster extractor on the local image, if any, and fall back to the
/// caption when it yields no events.
///
/// A failed visual call is logged and counts as "no events".
pub async fn extract_post_events(
    post: &Post,
    image_local_path: Option<&Path>,
    visual: &dyn VisualExtractor,
    text: &dyn TextExtractor,
) -> PostEvents {
    let outcome = match image_local_path {
        Some(path) => match visual
            .extract(&ImageRef::Path(path.to_path_buf()), &post.caption)
            .await
        {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(post_id = %post.id, error = %e, "Poster extraction failed");
                None
            }
        },
        None => None,
    };

    let poster_events = outcome
        .as_ref()
        .map(|o| o.events().to_vec())
        .unwrap_or_default();

    if !poster_events.is_empty() {
        return PostEvents {
            visual: outcome,
            source: EventSource::Poster,
            events: poster_events,
        };
    }

    info!(post_id = %post.id, "No poster events, falling back to caption");
    let fallback = text.extract(&post.caption, &post.timestamp).await;
    PostEvents {
        visual: outcome,
        source: EventSource::Caption,
        events: fallback.events,
    }
}

pub struct Pipeline {
    fetcher: Arc<dyn SourceFetcher>,
    media: Arc<dyn MediaMaterializer>,
    visual: Arc<dyn VisualExtractor>,
    text: Arc<dyn TextExtractor>,
}

impl Pipeline {
    pub fn new(
        fetcher: Arc<dyn SourceFetcher>,
        media: Arc<dyn MediaMaterializer>,
        visual: Arc<dyn VisualExtractor>,
        text: Arc<dyn TextExtractor>,
    ) -> Self {
        Self {
            fetcher,
            media,
            visual,
            text,
        }
    }

    /// Production wiring. Both credentials are checked here, before any
    /// network call is made.
    pub fn from_config(config: &Config) -> Result<Self> {
        let fetcher = ApifyFetcher::from_config(config)?;
        let openai_key = config.require_openai_key()?;

        Ok(Self::new(
            Arc::new(fetcher),
            Arc::new(HttpMaterializer::from_config(config)?),
            Arc::new(PosterExtractor::openai(openai_key, &config.vision_model)?),
            Arc::new(CaptionExtractor::openai(openai_key, &config.text_model)),
        ))
    }

    /// Fetch posts and extract events for each. A fetch failure aborts the
    /// batch; per-post failures only cost that post its events.
    pub async fn aggregate(&self, request: &FetchRequest) -> Result<Vec<AggregatedPost>> {
        let posts = self.fetcher.fetch_posts(request).await?;
        info!(posts = posts.len(), "Aggregating posts");

        let mut aggregated = Vec::with_capacity(posts.len());
        for post in posts {
            aggregated.push(self.process_post(post).await);
        }

        let with_events = aggregated.iter().filter(|a| !a.events.is_empty()).count();
        info!(posts = aggregated.len(), with_events, "Aggregation complete");
        Ok(aggregated)
    }

    pub async fn process_post(&self, post: Post) -> AggregatedPost {
        let image_local_path = self.media.materialize(&post).await;

        let extracted = extract_post_events(
            &post,
            image_local_path.as_deref(),
            self.visual.as_ref(),
            self.text.as_ref(),
        )
        .await;

        AggregatedPost {
            post,
            image_local_path,
            visual: extracted.visual,
            source: extracted.source,
            events: extracted.events,
        }
    }
}
