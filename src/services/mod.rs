pub mod gemini;
pub mod normalizer;
pub mod relay;
