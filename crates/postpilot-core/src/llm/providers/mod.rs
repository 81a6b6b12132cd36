/// `OpenAI` and OpenAI-compatible chat provider
pub mod openai;

pub use openai::OpenAiProvider;
