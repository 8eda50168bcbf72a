// Media Materializer: one local JPEG per post, named from (owner, timestamp).
//
// Downloads and decoding failures are not errors for the batch; they surface
// as `None` and the post continues without a poster image.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::types::{Post, PostKind};
use crate::video::FrameGrabber;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Lower-case alphanumeric runs joined by single underscores.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_sep = false;
    for c in value.chars() {
        if c.is_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    slug
}

/// ISO-8601 timestamp (trailing `Z` accepted) to `YYYYMMDD_HHMMSS`, in the
/// timestamp's own offset.
pub fn timestamp_slug(timestamp: &str) -> Result<String> {
    let trimmed = timestamp.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.format("%Y%m%d_%H%M%S").to_string());
    }
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|dt| dt.format("%Y%m%d_%H%M%S").to_string())
        .map_err(|_| PipelineError::Timestamp(timestamp.to_string()))
}

/// `{owner_slug}_{YYYYMMDD_HHMMSS}.jpg`; a pure function of its inputs.
pub fn media_filename(owner: &str, timestamp: &str) -> Result<String> {
    let slug = slugify(owner);
    let slug = if slug.is_empty() { "unknown".to_string() } else { slug };
    Ok(format!("{}_{}.jpg", slug, timestamp_slug(timestamp)?))
}

#[async_trait]
pub trait MediaMaterializer: Send + Sync {
    /// Local path of the post's representative image, or `None` when it
    /// could not be produced.
    async fn materialize(&self, post: &Post) -> Option<PathBuf>;
}

pub struct HttpMaterializer {
    http: reqwest::Client,
    media_dir: PathBuf,
    frames: FrameGrabber,
}

impl HttpMaterializer {
    pub fn new(media_dir: impl Into<PathBuf>, frames: FrameGrabber) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            media_dir: media_dir.into(),
            frames,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.media_dir,
            FrameGrabber::new(&config.ffmpeg_path, &config.ffprobe_path),
        )
    }

    fn destination(&self, post: &Post) -> Option<PathBuf> {
        match media_filename(&post.owner, &post.timestamp) {
            Ok(name) => Some(self.media_dir.join(name)),
            Err(e) => {
                warn!(post_id = %post.id, error = %e, "Cannot name media file");
                None
            }
        }
    }

    async fn ensure_media_dir(&self) -> Option<()> {
        tokio::fs::create_dir_all(&self.media_dir)
            .await
            .map_err(|e| warn!(dir = %self.media_dir.display(), error = %e, "Cannot create media dir"))
            .ok()
    }

    /// Fetch a URL's body; `None` on transport error or non-success status.
    async fn fetch_bytes(&self, url: &str) -> Option<Vec<u8>> {
        let resp = match self.http.get(url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(url, error = %e, "Media download failed");
                return None;
            }
        };
        if !resp.status().is_success() {
            warn!(url, status = %resp.status(), "Media download returned non-success status");
            return None;
        }
        match resp.bytes().await {
            Ok(bytes) => Some(bytes.to_vec()),
            Err(e) => {
                warn!(url, error = %e, "Media download interrupted");
                None
            }
        }
    }

    /// Download a still image straight to its final name.
    pub async fn download_image(&self, url: &str, dest: &Path) -> Option<PathBuf> {
        let bytes = self.fetch_bytes(url).await?;
        self.ensure_media_dir().await?;
        match tokio::fs::write(dest, &bytes).await {
            Ok(()) => {
                debug!(path = %dest.display(), bytes = bytes.len(), "Saved image");
                Some(dest.to_path_buf())
            }
            Err(e) => {
                warn!(path = %dest.display(), error = %e, "Cannot write image");
                None
            }
        }
    }

    /// Download a video to a temporary file and keep only its last-second
    /// frame. The temporary file is removed on return.
    pub async fn download_video_frame(&self, url: &str, dest: &Path) -> Option<PathBuf> {
        let bytes = self.fetch_bytes(url).await?;

        let mut tmp = tempfile::Builder::new()
            .prefix("venue-video-")
            .suffix(".mp4")
            .tempfile()
            .map_err(|e| warn!(error = %e, "Cannot create temporary video file"))
            .ok()?;
        tmp.write_all(&bytes)
            .and_then(|_| tmp.flush())
            .map_err(|e| warn!(error = %e, "Cannot write temporary video file"))
            .ok()?;

        self.ensure_media_dir().await?;
        self.frames.grab_last_second(tmp.path(), dest).await
    }
}

#[async_trait]
impl MediaMaterializer for HttpMaterializer {
    async fn materialize(&self, post: &Post) -> Option<PathBuf> {
        let dest = self.destination(post)?;

        let saved = match (post.kind, post.video_url.as_deref(), post.image_url()) {
            (PostKind::Video, Some(video_url), _) => self.download_video_frame(video_url, &dest).await,
            (PostKind::Image, _, Some(image_url)) => self.download_image(image_url, &dest).await,
            _ => {
                debug!(post_id = %post.id, "Post has no downloadable media");
                None
            }
        };

        if let Some(ref path) = saved {
            info!(post_id = %post.id, path = %path.display(), "Materialized media");
        }
        saved
    }
}
