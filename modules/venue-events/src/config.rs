use std::path::PathBuf;

use crate::error::{PipelineError, Result};

/// Runtime configuration, read from the environment (and `.env`).
///
/// Credentials stay optional here; each component asks for the one it needs
/// through `require_*` so a missing key aborts before any network call.
#[derive(Debug, Clone)]
pub struct Config {
    // Credentials
    pub apify_token: Option<String>,
    pub openai_api_key: Option<String>,

    // Models
    pub vision_model: String,
    pub text_model: String,

    // Local storage
    pub media_dir: PathBuf,
    pub events_csv: PathBuf,
    pub events_enriched_csv: PathBuf,

    // Video tooling
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            apify_token: None,
            openai_api_key: None,
            vision_model: "gpt-4o-mini".to_string(),
            text_model: "gpt-4o-mini".to_string(),
            media_dir: PathBuf::from("images"),
            events_csv: PathBuf::from("events.csv"),
            events_enriched_csv: PathBuf::from("events_enriched.csv"),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        Self {
            apify_token: non_empty_var("APIFY_TOKEN"),
            openai_api_key: non_empty_var("OPENAI_API_KEY"),
            vision_model: non_empty_var("OPENAI_VISION_MODEL").unwrap_or(defaults.vision_model),
            text_model: non_empty_var("OPENAI_TEXT_MODEL").unwrap_or(defaults.text_model),
            media_dir: non_empty_var("MEDIA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.media_dir),
            events_csv: non_empty_var("EVENTS_CSV")
                .map(PathBuf::from)
                .unwrap_or(defaults.events_csv),
            events_enriched_csv: non_empty_var("EVENTS_ENRICHED_CSV")
                .map(PathBuf::from)
                .unwrap_or(defaults.events_enriched_csv),
            ffmpeg_path: non_empty_var("FFMPEG_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.ffmpeg_path),
            ffprobe_path: non_empty_var("FFPROBE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.ffprobe_path),
        }
    }

    pub fn require_apify_token(&self) -> Result<&str> {
        self.apify_token
            .as_deref()
            .ok_or(PipelineError::MissingCredential("APIFY_TOKEN"))
    }

    pub fn require_openai_key(&self) -> Result<&str> {
        self.openai_api_key
            .as_deref()
            .ok_or(PipelineError::MissingCredential("OPENAI_API_KEY"))
    }

    /// Log the configuration with secrets reduced to a short prefix.
    pub fn log_redacted(&self) {
        fn preview(val: &Option<String>) -> String {
            match val {
                Some(v) => {
                    let n = v.char_indices().nth(5).map(|(i, _)| i).unwrap_or(v.len());
                    format!("{}...({} chars)", &v[..n], v.len())
                }
                None => "<not set>".to_string(),
            }
        }

        tracing::info!("Config loaded:");
        tracing::info!("  APIFY_TOKEN: {}", preview(&self.apify_token));
        tracing::info!("  OPENAI_API_KEY: {}", preview(&self.openai_api_key));
        tracing::info!("  vision_model: {}", self.vision_model);
        tracing::info!("  text_model: {}", self.text_model);
        tracing::info!("  media_dir: {}", self.media_dir.display());
        tracing::info!("  events_csv: {}", self.events_csv.display());
        tracing::info!("  events_enriched_csv: {}", self.events_enriched_csv.display());
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credentials_are_reported_by_name() {
        let config = Config::default();
        let err = config.require_apify_token().unwrap_err();
        assert!(matches!(err, PipelineError::MissingCredential("APIFY_TOKEN")));
        assert!(err.to_string().contains("APIFY_TOKEN"));

        let err = config.require_openai_key().unwrap_err();
        assert!(matches!(err, PipelineError::MissingCredential("OPENAI_API_KEY")));
    }

    #[test]
    fn present_credentials_are_returned() {
        let config = Config {
            apify_token: Some("apify_api_abc".to_string()),
            openai_api_key: Some("sk-test".to_string()),
            ..Config::default()
        };
        assert_eq!(config.require_apify_token().unwrap(), "apify_api_abc");
        assert_eq!(config.require_openai_key().unwrap(), "sk-test");
    }

    #[test]
    fn defaults_match_documented_paths() {
        let config = Config::default();
        assert_eq!(config.events_csv, PathBuf::from("events.csv"));
        assert_eq!(config.events_enriched_csv, PathBuf::from("events_enriched.csv"));
        assert_eq!(config.media_dir, PathBuf::from("images"));
    }
}
