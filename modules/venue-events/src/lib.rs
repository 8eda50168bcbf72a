pub mod config;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod media;
pub mod pipeline;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod types;
pub mod video;

pub use config::Config;
pub use error::{PipelineError, Result};
pub use pipeline::Pipeline;
