pub mod openai;
pub mod traits;
pub mod util;

pub use openai::{OpenAi, OpenAiOutputBuilder, OpenAiPromptBuilder, StructuredOutput};
pub use traits::{Agent, ImageInput, OutputBuilder, PromptBuilder};
