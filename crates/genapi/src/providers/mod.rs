pub mod gemini;
pub mod openai;
pub mod sdwebui;
