pub mod openai;

pub use openai::OpenAiCaller;
